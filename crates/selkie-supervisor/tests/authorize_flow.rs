//! End-to-end tests for the `/oauth2/authorize` endpoint.
//!
//! Each test reconciles a cluster fixture into the registry, then drives
//! the axum router directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use selkie_supervisor::clients::InMemoryCluster;
use selkie_supervisor::http::{AuthorizeState, create_router};
use selkie_supervisor::oauth::{ClientRegistry, InMemoryAuthCodeStore};
use selkie_supervisor::providers::testing::StaticUpstreamProvider;
use selkie_supervisor::providers::{UpstreamProvider, UpstreamProviderCache};
use selkie_supervisor::registry::FederationDomainRegistry;
use selkie_supervisor::resolver::FederationDomainReconciler;
use selkie_supervisor::resources::{
    FederationDomain, FederationDomainSpec, IdentityProviderKind, IdentityProviderRef,
    IdentityProviderResource, ObjectMeta, ObjectRef, TransformExpressionSpec,
};
use selkie_supervisor::state::{
    CodecKeys, StateCodec, UPSTREAM_STATE_PARAM_ENCODING_NAME, UpstreamStateParamData,
};
use selkie_transform::{TransformEngine, TransformEngineConfig};

const NAMESPACE: &str = "supervisor";
const ISSUER: &str = "https://issuer.example.com/demo";
const REDIRECT_URI: &str = "http://127.0.0.1:8123/callback";

struct Harness {
    cluster: Arc<InMemoryCluster>,
    upstreams: Arc<UpstreamProviderCache>,
    reconciler: FederationDomainReconciler,
    codec: StateCodec,
    router: Router,
}

fn harness() -> Harness {
    let cluster = Arc::new(InMemoryCluster::new());
    let upstreams = Arc::new(UpstreamProviderCache::new());
    let registry = Arc::new(FederationDomainRegistry::new(upstreams.clone()));
    let engine = Arc::new(TransformEngine::new(TransformEngineConfig::default()));
    let reconciler = FederationDomainReconciler::new(
        cluster.clone(),
        cluster.clone(),
        registry.clone(),
        engine,
        Duration::from_secs(5),
        NAMESPACE,
    );
    let codec = StateCodec::new(CodecKeys::new(b"integration-test-signing-key"));
    let state = AuthorizeState {
        registry,
        clients: ClientRegistry::default(),
        auth_code_store: Arc::new(InMemoryAuthCodeStore::new()),
        state_codec: codec.clone(),
        authorization_code_lifetime: Duration::from_secs(600),
    };
    let router = create_router(state);
    Harness {
        cluster,
        upstreams,
        reconciler,
        codec,
        router,
    }
}

impl Harness {
    /// Register an OIDC upstream and its cluster resource under `name`.
    fn add_oidc_idp(&self, name: &str) {
        let resource =
            IdentityProviderResource::new(IdentityProviderKind::Oidc, NAMESPACE, name);
        let upstream: Arc<dyn UpstreamProvider> = Arc::new(
            StaticUpstreamProvider::oidc(
                name,
                &resource.metadata.uid,
                "https://upstream.example.com/auth",
            )
            .with_user("alice", "secret-pw", &["devs", "admins"]),
        );
        self.upstreams.set(upstream);
        self.cluster.upsert_identity_provider(resource);
    }

    fn add_domain(&self, name: &str, issuer: &str, providers: Vec<IdentityProviderRef>) {
        self.cluster.upsert_federation_domain(FederationDomain {
            metadata: ObjectMeta::named(NAMESPACE, name),
            spec: FederationDomainSpec {
                issuer: issuer.to_string(),
                tls: None,
                identity_providers: providers,
            },
            status: Default::default(),
        });
    }

    async fn reconcile(&self) {
        self.reconciler.sync().await.expect("reconcile failed");
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.expect("request failed")
    }
}

fn idp_ref(display_name: &str, name: &str) -> IdentityProviderRef {
    IdentityProviderRef {
        display_name: display_name.to_string(),
        object_ref: ObjectRef {
            api_group: Some("idp.supervisor.dev".to_string()),
            kind: "OIDCIdentityProvider".to_string(),
            name: name.to_string(),
        },
        transforms: Default::default(),
    }
}

fn authorize_query(extra: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = vec![
        ("response_type".to_string(), "code".to_string()),
        ("client_id".to_string(), "pinniped-cli".to_string()),
        ("redirect_uri".to_string(), REDIRECT_URI.to_string()),
        ("scope".to_string(), "openid offline_access groups".to_string()),
        ("state".to_string(), "client-state-value".to_string()),
        ("nonce".to_string(), "client-nonce-value".to_string()),
        (
            "code_challenge".to_string(),
            // SHA-256 of a fixed verifier, from RFC 7636 Appendix B.
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
        ),
        ("code_challenge_method".to_string(), "S256".to_string()),
    ];
    for (key, value) in extra {
        pairs.push(((*key).to_string(), (*value).to_string()));
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn location_of(response: &axum::response::Response) -> url::Url {
    let location = response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .expect("Location is not a string");
    url::Url::parse(location).expect("Location is not a URL")
}

fn query_map(url: &url::Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Scenario: browserless happy path
// =============================================================================

#[tokio::test]
async fn test_browserless_happy_path_issues_code() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[("pinniped_idp_name", "my-oidc")])
    );
    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::HOST, "issuer.example.com")
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "secret-pw")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(
        response.headers().get(header::SET_COOKIE).is_none(),
        "browserless responses must not set cookies"
    );

    let location = location_of(&response);
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let query = query_map(&location);
    assert!(query["code"].starts_with("sk_ac_"));
    assert_eq!(query["state"], "client-state-value");
}

#[tokio::test]
async fn test_browserless_rejects_wrong_password_and_wrong_client() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[("pinniped_idp_name", "my-oidc")])
    );
    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .header(header::HOST, "issuer.example.com")
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let query = query_map(&location_of(&response));
    assert_eq!(query["error"], "access_denied");

    // Blank credentials are refused before touching the upstream.
    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .header(header::HOST, "issuer.example.com")
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let query = query_map(&location_of(&response));
    assert_eq!(query["error"], "access_denied");
    assert!(query["error_description"].contains("Missing or blank"));
}

// =============================================================================
// Scenario: browser happy path
// =============================================================================

#[tokio::test]
async fn test_browser_happy_path_redirects_upstream_with_state_and_cookie() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[("pinniped_idp_name", "my-oidc")])
    );
    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = location_of(&response);
    assert_eq!(location.host_str(), Some("upstream.example.com"));
    let query = query_map(&location);
    assert!(!query["nonce"].is_empty());
    assert!(!query["code_challenge"].is_empty());
    assert_eq!(query["code_challenge_method"], "S256");

    // Exactly one state param, decodable, naming the resolved provider.
    let state_values: Vec<_> = location
        .query_pairs()
        .filter(|(k, _)| k == "state")
        .collect();
    assert_eq!(state_values.len(), 1);
    let decoded: UpstreamStateParamData = h
        .codec
        .decode(UPSTREAM_STATE_PARAM_ENCODING_NAME, &query["state"])
        .expect("state param must decode");
    assert_eq!(decoded.upstream_name, "my-oidc");
    assert_eq!(decoded.upstream_type, "oidc");
    assert_eq!(decoded.format_version, "2");
    // The IdP selection params are stripped from the forwarded request.
    assert!(!decoded.auth_params.contains("pinniped_idp_name"));
    assert!(decoded.auth_params.contains("client_id=pinniped-cli"));

    // CSRF cookie with the locked-down attributes.
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("browser flow must set the CSRF cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("__Host-pinniped-csrf="));
    for attribute in ["HttpOnly", "Secure", "SameSite=Lax", "Path=/"] {
        assert!(set_cookie.contains(attribute), "missing {attribute}");
    }

    // CSRF token in the state param matches the cookie's token.
    let cookie_value = set_cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("__Host-pinniped-csrf=");
    let cookie_token: selkie_supervisor::state::CsrfToken = h
        .codec
        .decode(selkie_supervisor::state::CSRF_COOKIE_ENCODING_NAME, cookie_value)
        .unwrap();
    assert_eq!(cookie_token, decoded.csrf_token);
}

#[tokio::test]
async fn test_browser_flow_reuses_valid_csrf_cookie() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[("pinniped_idp_name", "my-oidc")])
    );

    let first = h
        .send(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let set_cookie = first
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    let cookie_pair = set_cookie.split(';').next().unwrap().to_string();

    // Replaying with the cookie keeps the same token and sets no new one.
    let second = h
        .send(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .header(header::HOST, "issuer.example.com")
                .header(header::COOKIE, cookie_pair.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(second.headers().get(header::SET_COOKIE).is_none());

    let state_param = query_map(&location_of(&second))["state"].clone();
    let decoded: UpstreamStateParamData = h
        .codec
        .decode(UPSTREAM_STATE_PARAM_ENCODING_NAME, &state_param)
        .unwrap();
    let cookie_token: selkie_supervisor::state::CsrfToken = h
        .codec
        .decode(
            selkie_supervisor::state::CSRF_COOKIE_ENCODING_NAME,
            cookie_pair.trim_start_matches("__Host-pinniped-csrf="),
        )
        .unwrap();
    assert_eq!(decoded.csrf_token, cookie_token);

    // A garbage cookie is ignored and replaced with a fresh one.
    let third = h
        .send(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .header(header::HOST, "issuer.example.com")
                .header(header::COOKIE, "__Host-pinniped-csrf=garbage-value")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(third.headers().get(header::SET_COOKIE).is_some());
}

// =============================================================================
// Scenario: identity provider chooser
// =============================================================================

#[tokio::test]
async fn test_idp_chooser_redirect_preserves_query() {
    let h = harness();
    h.add_oidc_idp("sso-one");
    h.add_oidc_idp("sso-two");
    h.add_domain(
        "demo",
        ISSUER,
        vec![idp_ref("first", "sso-one"), idp_ref("second", "sso-two")],
    );
    h.reconcile().await;

    let query = authorize_query(&[]);
    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(format!("/demo/oauth2/authorize?{query}"))
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location_of(&response);
    assert!(
        location
            .as_str()
            .starts_with("https://issuer.example.com/demo/choose_identity_provider?")
    );
    // The original params all survive the round trip.
    let forwarded = query_map(&location);
    assert_eq!(forwarded["client_id"], "pinniped-cli");
    assert_eq!(forwarded["state"], "client-state-value");
    assert_eq!(forwarded["code_challenge_method"], "S256");
}

#[tokio::test]
async fn test_browserless_request_skips_chooser() {
    let h = harness();
    h.add_oidc_idp("sso-one");
    h.add_oidc_idp("sso-two");
    h.add_domain(
        "demo",
        ISSUER,
        vec![idp_ref("first", "sso-one"), idp_ref("second", "sso-two")],
    );
    h.reconcile().await;

    // Browserless requests never see the interstitial; with no IdP name
    // and no default provider they fail instead.
    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/demo/oauth2/authorize?{}", authorize_query(&[])))
                .header(header::HOST, "issuer.example.com")
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "secret-pw")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let query = query_map(&location_of(&response));
    assert_eq!(query["error"], "invalid_request");
}

// =============================================================================
// Scenario: prompt=none
// =============================================================================

#[tokio::test]
async fn test_prompt_none_with_openid_scope_is_login_required() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[("pinniped_idp_name", "my-oidc"), ("prompt", "none")])
    );
    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location_of(&response);
    assert!(location.as_str().starts_with(REDIRECT_URI));
    assert_eq!(query_map(&location)["error"], "login_required");
}

// =============================================================================
// Scenario: transform policy rejection
// =============================================================================

#[tokio::test]
async fn test_policy_rejection_maps_to_access_denied_with_reason() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    let mut idp = idp_ref("my-oidc", "corp-sso");
    idp.transforms.expressions = vec![TransformExpressionSpec {
        expression_type: "policy/v1".to_string(),
        expression: r#"!("devs" in groups)"#.to_string(),
        message: Some("no contractors".to_string()),
    }];
    h.add_domain("demo", ISSUER, vec![idp]);
    h.reconcile().await;

    // alice is in "devs", so the policy rejects her.
    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/demo/oauth2/authorize?{}",
                    authorize_query(&[("pinniped_idp_name", "my-oidc")])
                ))
                .header(header::HOST, "issuer.example.com")
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "secret-pw")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location_of(&response);
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let query = query_map(&location);
    assert_eq!(query["error"], "access_denied");
    assert_eq!(query["error_description"], "Reason: no contractors.");
    assert_eq!(query["state"], "client-state-value");
}

// =============================================================================
// Scenario: duplicate issuer
// =============================================================================

#[tokio::test]
async fn test_duplicate_issuers_serve_nothing() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("one", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.add_domain("two", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/demo/oauth2/authorize?{}",
                    authorize_query(&[("pinniped_idp_name", "my-oidc")])
                ))
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Protocol edges
// =============================================================================

#[tokio::test]
async fn test_other_methods_are_rejected() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    for method in ["PUT", "DELETE", "PATCH"] {
        let response = h
            .send(
                Request::builder()
                    .method(method)
                    .uri("/demo/oauth2/authorize")
                    .header(header::HOST, "issuer.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&body),
            format!("{method} (try GET or POST)")
        );
    }
}

#[tokio::test]
async fn test_every_response_carries_a_content_security_policy() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/demo/oauth2/authorize?{}",
                    authorize_query(&[("pinniped_idp_name", "my-oidc")])
                ))
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let csp = response
        .headers()
        .get(header::CONTENT_SECURITY_POLICY)
        .expect("missing CSP header")
        .to_str()
        .unwrap();
    assert!(csp.contains("default-src 'none'"));
}

#[tokio::test]
async fn test_form_post_response_mode_renders_error_page() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let uri = format!(
        "/demo/oauth2/authorize?{}",
        authorize_query(&[
            ("pinniped_idp_name", "my-oidc"),
            ("prompt", "none"),
            ("response_mode", "form_post"),
        ])
    );
    let response = h
        .send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::HOST, "issuer.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let csp = response
        .headers()
        .get(header::CONTENT_SECURITY_POLICY)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(csp.contains("script-src 'sha256-"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("login_required"));
    assert!(html.contains(REDIRECT_URI));
    assert!(html.contains("client-state-value"));
}

#[tokio::test]
async fn test_multipart_form_body_is_accepted() {
    let h = harness();
    h.add_oidc_idp("corp-sso");
    h.add_domain("demo", ISSUER, vec![idp_ref("my-oidc", "corp-sso")]);
    h.reconcile().await;

    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = String::new();
    for (name, value) in [
        ("response_type", "code"),
        ("client_id", "pinniped-cli"),
        ("redirect_uri", REDIRECT_URI),
        ("scope", "openid groups"),
        ("state", "client-state-value"),
        ("code_challenge", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"),
        ("code_challenge_method", "S256"),
        ("pinniped_idp_name", "my-oidc"),
    ] {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/demo/oauth2/authorize")
                .header(header::HOST, "issuer.example.com")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .header("Pinniped-Username", "alice")
                .header("Pinniped-Password", "secret-pw")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let query = query_map(&location_of(&response));
    assert!(query["code"].starts_with("sk_ac_"));
}
