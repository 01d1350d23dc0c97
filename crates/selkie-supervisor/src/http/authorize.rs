//! The OAuth2/OIDC authorization endpoint.
//!
//! One handler serves two flows that share a request pipeline:
//!
//! - **Browser flow**: no credential headers. The handler validates the
//!   request, mints CSRF/nonce/PKCE values, threads everything through the
//!   authenticated upstream state parameter, and 303-redirects the user
//!   agent to the upstream provider's authorization endpoint. No session is
//!   stored; the upstream callback handler reconstructs everything from the
//!   state parameter.
//! - **Browserless flow**: the `Pinniped-Username`/`Pinniped-Password`
//!   headers carry credentials. The handler logs in against the upstream
//!   directly, applies the domain's identity transformations, persists an
//!   authorization code, and 303-redirects straight back to the client.
//!
//! Every failure funnels into one render site that picks between an OAuth2
//! error redirect, a form-post error page, and a fatal non-redirect error.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

use selkie_transform::TransformError;

use super::{
    AUTHORIZE_ENDPOINT_PATH, AUTHORIZE_PASSWORD_HEADER, AUTHORIZE_USERNAME_HEADER,
    CHOOSE_IDP_ENDPOINT_PATH, IDP_NAME_PARAM, IDP_TYPE_PARAM,
};
use crate::error::{AuthorizeError, AuthorizeResult};
use crate::oauth::clients::{CLI_CLIENT_ID, ClientRegistry};
use crate::oauth::request::{AuthorizeRequest, RedirectContext, ResponseMode};
use crate::oauth::response::{
    error_redirect_url, error_response_params, form_post_page, success_redirect_url,
};
use crate::oauth::store::{AuthCodeStore, DownstreamSession, issue_authorization_code};
use crate::providers::{ResolvedIdentityProvider, UpstreamAuthorizeRequestState};
use crate::registry::{FederationDomainHandle, FederationDomainRegistry};
use crate::state::{
    CSRF_COOKIE_ENCODING_NAME, CSRF_COOKIE_NAME, CsrfToken, Nonce, StateCodec,
    UPSTREAM_STATE_PARAM_ENCODING_NAME, UPSTREAM_STATE_PARAM_FORMAT_VERSION,
    UpstreamStateParamData,
};

/// Shared state for the authorization endpoint.
#[derive(Clone)]
pub struct AuthorizeState {
    /// Published federation domains.
    pub registry: Arc<FederationDomainRegistry>,

    /// Registered downstream clients.
    pub clients: ClientRegistry,

    /// Persistence for codes issued by the browserless flow. The browser
    /// flow never touches it.
    pub auth_code_store: Arc<dyn AuthCodeStore>,

    /// Codec for the upstream state parameter and the CSRF cookie.
    pub state_codec: StateCodec,

    /// Lifetime of issued authorization codes.
    pub authorization_code_lifetime: Duration,
}

/// Entry point for every request under the wildcard route.
pub async fn authorize_handler(
    State(state): State<AuthorizeState>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(issuer_path) = path.strip_suffix(AUTHORIZE_ENDPOINT_PATH) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let method = request.method().clone();
    if method != Method::GET && method != Method::POST {
        // OIDC Core requires GET and POST at the authorization endpoint;
        // everything else is rejected outright.
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} (try GET or POST)"),
        )
            .into_response();
    }

    let Some(domain) = find_federation_domain(&state, request.headers(), issuer_path) else {
        tracing::debug!(path = %path, "request for an unpublished issuer");
        return StatusCode::NOT_FOUND.into_response();
    };

    let requested_browserless_flow = request.headers().contains_key(AUTHORIZE_USERNAME_HEADER)
        || request.headers().contains_key(AUTHORIZE_PASSWORD_HEADER);

    let headers = request.headers().clone();
    let params = match collect_params(request).await {
        Ok(params) => params,
        Err(e) => return render_error(&e, None),
    };

    let idp_name = single_param(&params, IDP_NAME_PARAM).unwrap_or_default().to_string();

    if should_show_idp_chooser(&domain, &idp_name, requested_browserless_flow) {
        let query = encode_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        return see_other(&format!(
            "{}{}?{}",
            domain.issuer().issuer_str(),
            CHOOSE_IDP_ENDPOINT_PATH,
            query
        ));
    }

    // Client and redirect URI must be trusted before any error may be
    // delivered by redirect; failures here are fatal.
    let redirect_context = match AuthorizeRequest::validate_redirect(&params, &state.clients) {
        Ok(context) => context,
        Err(e) => return render_error(&e, None),
    };

    let idp = match choose_upstream_idp(&domain, &idp_name) {
        Ok(idp) => idp,
        Err(e) => return render_error(&e, Some(&redirect_context)),
    };

    let authorize_request = match AuthorizeRequest::parse(params, &state.clients) {
        Ok(request) => request,
        Err(e) => return render_error(&e, Some(&redirect_context)),
    };

    let outcome = if requested_browserless_flow {
        authorize_without_browser(&state, &headers, &authorize_request, &idp).await
    } else {
        authorize_with_browser(&state, &headers, &domain, &authorize_request, &idp)
    };

    match outcome {
        Ok(response) => response,
        Err(e) => render_error(&e, Some(&authorize_request.redirect_context())),
    }
}

/// Resolve the published federation domain serving this request.
fn find_federation_domain(
    state: &AuthorizeState,
    headers: &HeaderMap,
    issuer_path: &str,
) -> Option<FederationDomainHandle> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let issuer_path = if issuer_path.is_empty() { "/" } else { issuer_path };
    let issuer_key = format!("https://{}{}", host.to_lowercase(), issuer_path);
    state.registry.find_by_issuer_key(&issuer_key)
}

/// Gather request parameters: the query string for GET, the query string
/// plus the form body for POST.
async fn collect_params(request: Request) -> AuthorizeResult<Vec<(String, String)>> {
    let mut params: Vec<(String, String)> = Vec::new();
    if let Some(query) = request.uri().query() {
        params.extend(
            form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    if request.method() == Method::POST {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let body = axum::body::to_bytes(request.into_body(), 1 << 20)
                .await
                .map_err(|_| {
                    AuthorizeError::invalid_request(
                        "Unable to read the request body, make sure to send a properly \
                         formatted form request body.",
                    )
                })?;
            params.extend(
                form_urlencoded::parse(&body).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        } else if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(request, &()).await.map_err(|_| {
                AuthorizeError::invalid_request(
                    "Unable to parse multipart HTTP body, make sure to send a properly \
                     formatted form request body.",
                )
            })?;
            loop {
                match multipart.next_field().await {
                    Ok(Some(field)) => {
                        let Some(name) = field.name().map(ToString::to_string) else {
                            continue;
                        };
                        let value = field.text().await.map_err(|_| {
                            AuthorizeError::invalid_request(
                                "Unable to parse multipart HTTP body, make sure to send a \
                                 properly formatted form request body.",
                            )
                        })?;
                        params.push((name, value));
                    }
                    Ok(None) => break,
                    Err(_) => {
                        return Err(AuthorizeError::invalid_request(
                            "Unable to parse multipart HTTP body, make sure to send a properly \
                             formatted form request body.",
                        ));
                    }
                }
            }
        }
    }

    Ok(params)
}

fn single_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// The interstitial chooser applies when a browser request names no
/// provider on a domain with explicitly configured providers.
fn should_show_idp_chooser(
    domain: &FederationDomainHandle,
    idp_name: &str,
    requested_browserless_flow: bool,
) -> bool {
    idp_name.is_empty()
        && !requested_browserless_flow
        && !domain.has_default_provider()
        && domain.provider_count() > 0
}

fn choose_upstream_idp(
    domain: &FederationDomainHandle,
    idp_name: &str,
) -> AuthorizeResult<ResolvedIdentityProvider> {
    if idp_name.is_empty() {
        // Requests without the IdP name param only work in the legacy
        // back-compat mode, where the sole provider is the default.
        Ok(domain.find_default_provider()?)
    } else {
        Ok(domain.find_provider_by_display_name(idp_name)?)
    }
}

// =============================================================================
// Browser flow
// =============================================================================

fn authorize_with_browser(
    state: &AuthorizeState,
    headers: &HeaderMap,
    domain: &FederationDomainHandle,
    authorize_request: &AuthorizeRequest,
    idp: &ResolvedIdentityProvider,
) -> AuthorizeResult<Response> {
    let csrf_from_cookie = read_csrf_cookie(headers, &state.state_codec);
    let reusing_cookie = csrf_from_cookie.is_some();
    let csrf_token = csrf_from_cookie.unwrap_or_else(CsrfToken::generate);
    let nonce = Nonce::generate();
    let pkce = crate::oauth::pkce::PkceCode::generate();

    let state_param_data = UpstreamStateParamData {
        auth_params: encode_params(
            authorize_request
                .form
                .iter()
                .filter(|(key, _)| key != IDP_NAME_PARAM && key != IDP_TYPE_PARAM)
                .map(|(k, v)| (k.as_str(), v.as_str())),
        ),
        upstream_name: idp.display_name().to_string(),
        upstream_type: idp.session_provider_type().as_str().to_string(),
        nonce: nonce.clone(),
        csrf_token: csrf_token.clone(),
        pkce_code: pkce.clone(),
        format_version: UPSTREAM_STATE_PARAM_FORMAT_VERSION.to_string(),
    };
    let encoded_state_param = state
        .state_codec
        .encode(UPSTREAM_STATE_PARAM_ENCODING_NAME, &state_param_data)
        .map_err(|e| {
            tracing::error!(error = %e, "could not encode upstream state param");
            AuthorizeError::server_error("Error encoding upstream state param.")
        })?;

    // OIDC `prompt=none` promises no interaction, but a federated login
    // always needs the upstream's interaction.
    if authorize_request.prompt.as_deref() == Some("none")
        && authorize_request.scope_was_requested("openid")
    {
        return Err(AuthorizeError::LoginRequired);
    }

    let upstream_state = UpstreamAuthorizeRequestState {
        encoded_state_param,
        nonce,
        pkce,
    };
    let redirect_url =
        idp.upstream_authorize_redirect_url(&upstream_state, domain.issuer().issuer_str())?;

    tracing::debug!(
        idp_display_name = %idp.display_name(),
        client_id = %authorize_request.client_id,
        "redirecting to upstream identity provider"
    );

    let mut response = see_other(redirect_url.as_str());
    if !reusing_cookie {
        let set_cookie = build_csrf_cookie(&csrf_token, &state.state_codec)?;
        response.headers_mut().append(
            header::SET_COOKIE,
            HeaderValue::from_str(&set_cookie).map_err(|_| {
                AuthorizeError::server_error("Error encoding CSRF cookie.")
            })?,
        );
    }
    Ok(response)
}

/// Decode the inbound CSRF cookie. Any failure reads as "no cookie": a
/// stale or rotated-away cookie is silently replaced, never reported.
fn read_csrf_cookie(headers: &HeaderMap, codec: &StateCodec) -> Option<CsrfToken> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(CSRF_COOKIE_NAME)?;
    codec.decode(CSRF_COOKIE_ENCODING_NAME, cookie.value()).ok()
}

fn build_csrf_cookie(token: &CsrfToken, codec: &StateCodec) -> AuthorizeResult<String> {
    let encoded = codec
        .encode(CSRF_COOKIE_ENCODING_NAME, token)
        .map_err(|e| {
            tracing::error!(error = %e, "could not encode CSRF cookie");
            AuthorizeError::server_error("Error encoding CSRF cookie.")
        })?;
    let cookie = Cookie::build((CSRF_COOKIE_NAME, encoded))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    Ok(cookie.to_string())
}

// =============================================================================
// Browserless flow
// =============================================================================

async fn authorize_without_browser(
    state: &AuthorizeState,
    headers: &HeaderMap,
    authorize_request: &AuthorizeRequest,
    idp: &ResolvedIdentityProvider,
) -> AuthorizeResult<Response> {
    if authorize_request.client_id != CLI_CLIENT_ID {
        return Err(AuthorizeError::access_denied(
            "This client is not allowed to submit username or password headers to this endpoint.",
        ));
    }

    let username = header_value(headers, AUTHORIZE_USERNAME_HEADER);
    let password = header_value(headers, AUTHORIZE_PASSWORD_HEADER);
    if username.is_empty() || password.is_empty() {
        return Err(AuthorizeError::access_denied(
            "Missing or blank username or password.",
        ));
    }

    let ignore_groups = !authorize_request.scope_was_granted("groups");
    let (identity, login_extras) = idp.login(&username, &password, ignore_groups).await?;

    let (username, groups) = apply_identity_transformations(
        idp,
        &identity.upstream_username,
        &identity.upstream_groups,
    )?;

    tracing::info!(
        idp_display_name = %idp.display_name(),
        username = %username,
        "browserless login succeeded"
    );

    let session = DownstreamSession {
        upstream_identity: identity,
        login_extras,
        username,
        groups,
        granted_scopes: authorize_request.granted_scopes.clone(),
        client_id: authorize_request.client_id.clone(),
        provider_display_name: idp.display_name().to_string(),
        provider_type: idp.session_provider_type(),
    };

    let code = issue_authorization_code(
        state.auth_code_store.as_ref(),
        session,
        authorize_request.redirect_uri.as_str(),
        authorize_request.code_challenge.clone(),
        state.authorization_code_lifetime,
    )
    .await;

    match authorize_request.response_mode {
        ResponseMode::Query => {
            let url = success_redirect_url(
                &authorize_request.redirect_uri,
                code.as_str(),
                authorize_request.state.as_deref(),
            );
            Ok(see_other(url.as_str()))
        }
        ResponseMode::FormPost => {
            let mut params = vec![("code".to_string(), code.as_str().to_string())];
            if let Some(client_state) = &authorize_request.state {
                params.push(("state".to_string(), client_state.clone()));
            }
            Ok(render_form_post(&authorize_request.redirect_uri, &params))
        }
    }
}

/// Run the provider's transformation pipeline over a fresh upstream login.
///
/// A policy rejection surfaces its configured message; an evaluation
/// failure surfaces nothing about the expressions.
fn apply_identity_transformations(
    idp: &ResolvedIdentityProvider,
    username: &str,
    groups: &[String],
) -> AuthorizeResult<(String, Vec<String>)> {
    let result = idp.transforms().evaluate(username, groups).map_err(|e| {
        match &e {
            TransformError::Timeout { budget } => {
                tracing::error!(
                    idp_display_name = %idp.display_name(),
                    ?budget,
                    "identity transformation timed out"
                );
            }
            other => {
                tracing::error!(
                    idp_display_name = %idp.display_name(),
                    error = %other,
                    "identity transformation failed"
                );
            }
        }
        AuthorizeError::access_denied(
            "Reason: unexpected error during identity transformation.",
        )
    })?;

    if !result.authentication_allowed {
        let message = result
            .rejected_authentication_message
            .unwrap_or_else(|| selkie_transform::DEFAULT_POLICY_REJECTED_MESSAGE.to_string());
        return Err(AuthorizeError::access_denied(format!("Reason: {message}.")));
    }

    Ok((result.username, result.groups))
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// =============================================================================
// Response rendering
// =============================================================================

/// The single error render site.
///
/// With a validated redirect context, redirectable errors travel to the
/// client via the chosen response mode. Without one (or for fatal errors)
/// the error renders directly as a 400, because redirecting to an
/// unvalidated URI would be an open redirect.
fn render_error(error: &AuthorizeError, redirect: Option<&RedirectContext>) -> Response {
    tracing::debug!(
        code = error.oauth_error_code(),
        description = error.description(),
        "authorize request failed"
    );

    match redirect {
        Some(context) if !error.is_fatal() => match context.response_mode {
            ResponseMode::Query => {
                let url = error_redirect_url(
                    &context.redirect_uri,
                    error,
                    context.state.as_deref(),
                );
                see_other(url.as_str())
            }
            ResponseMode::FormPost => {
                let params = error_response_params(error, context.state.as_deref());
                render_form_post(&context.redirect_uri, &params)
            }
        },
        _ => (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({
                "error": error.oauth_error_code(),
                "error_description": error.description(),
            })
            .to_string(),
        )
            .into_response(),
    }
}

fn render_form_post(redirect_uri: &url::Url, params: &[(String, String)]) -> Response {
    let (html, csp) = form_post_page(redirect_uri, params);
    let csp = HeaderValue::from_str(&csp)
        .unwrap_or_else(|_| HeaderValue::from_static("default-src 'none'"));
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            ),
            (header::CONTENT_SECURITY_POLICY, csp),
        ],
        html,
    )
        .into_response()
}

fn see_other(location: &str) -> Response {
    let location = HeaderValue::from_str(location)
        .unwrap_or_else(|_| HeaderValue::from_static("/"));
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location)],
        Body::empty(),
    )
        .into_response()
}

fn encode_params<'a>(params: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
