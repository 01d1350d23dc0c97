//! Authorization request parsing and validation.

use url::Url;

use super::clients::ClientRegistry;
use super::pkce::CodeChallenge;
use crate::error::{AuthorizeError, AuthorizeResult};

/// Scopes the supervisor grants automatically when requested, instead of
/// asking the user to approve them.
const AUTO_GRANTED_SCOPES: [&str; 4] = ["openid", "offline_access", "username", "groups"];

/// How the response parameters travel back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Parameters in the redirect URI query string.
    #[default]
    Query,
    /// Parameters posted from an auto-submitting HTML page.
    FormPost,
}

/// The part of a request that must be trusted before any error may be
/// redirected: the validated redirect target plus the client's `state` and
/// chosen response mode.
#[derive(Debug, Clone)]
pub struct RedirectContext {
    /// Validated redirect target.
    pub redirect_uri: Url,

    /// Opaque client state, echoed back on the response redirect.
    pub state: Option<String>,

    /// Response parameter transport. An unknown `response_mode` falls back
    /// to the query mode here so the later validation error can still be
    /// delivered.
    pub response_mode: ResponseMode,
}

/// A parsed and validated OAuth2/OIDC authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// The requesting client's id.
    pub client_id: String,

    /// Validated redirect target.
    pub redirect_uri: Url,

    /// Scopes the client asked for.
    pub requested_scopes: Vec<String>,

    /// Subset of the requested scopes granted automatically.
    pub granted_scopes: Vec<String>,

    /// Opaque client state, echoed back on the response redirect.
    pub state: Option<String>,

    /// OIDC nonce for the downstream ID token.
    pub nonce: Option<String>,

    /// Downstream PKCE challenge, stored with the issued code.
    pub code_challenge: CodeChallenge,

    /// Response parameter transport.
    pub response_mode: ResponseMode,

    /// The raw `prompt` parameter, when present.
    pub prompt: Option<String>,

    /// Every submitted parameter, in order, for re-encoding into the
    /// upstream state parameter.
    pub form: Vec<(String, String)>,
}

impl AuthorizeRequest {
    /// Validate only the client and redirect target, producing the context
    /// needed to deliver later validation errors by redirect.
    ///
    /// # Errors
    ///
    /// All errors from this stage are fatal: without a trusted redirect
    /// URI, an error can only be rendered directly.
    pub fn validate_redirect(
        params: &[(String, String)],
        clients: &ClientRegistry,
    ) -> AuthorizeResult<RedirectContext> {
        let get = |name: &str| -> Option<&str> {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let client_id = get("client_id")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthorizeError::invalid_client("The client_id param is required."))?;
        let client = clients.find(client_id).ok_or_else(|| {
            AuthorizeError::invalid_client(format!("Client {client_id:?} is not registered."))
        })?;

        let redirect_uri_param = get("redirect_uri").ok_or_else(|| {
            AuthorizeError::invalid_redirect_uri("The redirect_uri param is required.")
        })?;
        let redirect_uri = Url::parse(redirect_uri_param).map_err(|_| {
            AuthorizeError::invalid_redirect_uri("The redirect_uri param must be a valid URL.")
        })?;
        if !client.allows_redirect_uri(&redirect_uri) {
            return Err(AuthorizeError::invalid_redirect_uri(
                "The redirect_uri is not registered for this client.",
            ));
        }

        let response_mode = match get("response_mode") {
            Some("form_post") => ResponseMode::FormPost,
            _ => ResponseMode::Query,
        };

        Ok(RedirectContext {
            redirect_uri,
            state: get("state").map(ToString::to_string),
            response_mode,
        })
    }

    /// Parse and validate the submitted query or form parameters.
    ///
    /// Validation order follows the OAuth2 error model: the client and
    /// redirect URI are checked first (via [`Self::validate_redirect`]) and
    /// their failures are fatal; everything afterwards is redirectable to
    /// the now-trusted redirect URI.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorizeError`] describing the first failed
    /// validation.
    pub fn parse(
        params: Vec<(String, String)>,
        clients: &ClientRegistry,
    ) -> AuthorizeResult<Self> {
        let redirect_context = Self::validate_redirect(&params, clients)?;

        let get = |name: &str| -> Option<&str> {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        // From here on errors can be safely redirected to the client.
        match get("response_type") {
            Some("code") => {}
            Some(other) => {
                return Err(AuthorizeError::UnsupportedResponseType {
                    hint: format!("The response_type {other:?} is not supported, use \"code\"."),
                });
            }
            None => {
                return Err(AuthorizeError::invalid_request(
                    "The response_type param is required.",
                ));
            }
        }

        let requested_scopes: Vec<String> = get("scope")
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        let granted_scopes = requested_scopes
            .iter()
            .filter(|scope| AUTO_GRANTED_SCOPES.contains(&scope.as_str()))
            .cloned()
            .collect();

        let code_challenge =
            CodeChallenge::parse(get("code_challenge"), get("code_challenge_method"))
                .map_err(|e| AuthorizeError::invalid_request(format!("{e}.")))?;

        let response_mode = match get("response_mode") {
            None | Some("query") => ResponseMode::Query,
            Some("form_post") => ResponseMode::FormPost,
            Some(other) => {
                return Err(AuthorizeError::invalid_request(format!(
                    "The response_mode {other:?} is not supported."
                )));
            }
        };

        let client_id = get("client_id").unwrap_or_default().to_string();
        let nonce = get("nonce").map(ToString::to_string);
        let prompt = get("prompt").map(ToString::to_string);

        Ok(Self {
            client_id,
            redirect_uri: redirect_context.redirect_uri,
            requested_scopes,
            granted_scopes,
            state: redirect_context.state,
            nonce,
            code_challenge,
            response_mode,
            prompt,
            form: params,
        })
    }

    /// The redirect context of an already-validated request.
    #[must_use]
    pub fn redirect_context(&self) -> RedirectContext {
        RedirectContext {
            redirect_uri: self.redirect_uri.clone(),
            state: self.state.clone(),
            response_mode: self.response_mode,
        }
    }

    /// Returns `true` when the client asked for `scope`.
    #[must_use]
    pub fn scope_was_requested(&self, scope: &str) -> bool {
        self.requested_scopes.iter().any(|s| s == scope)
    }

    /// Returns `true` when `scope` was granted.
    #[must_use]
    pub fn scope_was_granted(&self, scope: &str) -> bool {
        self.granted_scopes.iter().any(|s| s == scope)
    }
}
