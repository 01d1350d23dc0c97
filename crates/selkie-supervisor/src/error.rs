//! Authorization endpoint error types.
//!
//! Every failure inside the authorize pipeline is expressed as one
//! [`AuthorizeError`] bubbled up to a single render site, which decides
//! between an OAuth2 error redirect, a form-post error page, and a fatal
//! non-redirect response.

use crate::providers::ProviderError;
use crate::registry::LookupError;

/// An error to be rendered by the authorization endpoint.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    /// The request is malformed or inconsistent. Redirected to the client
    /// when a valid `redirect_uri` is known.
    #[error("invalid_request: {hint}")]
    InvalidRequest {
        /// User-facing description.
        hint: String,
    },

    /// The login was refused: bad credentials, unsupported flow, or a
    /// policy rejection.
    #[error("access_denied: {hint}")]
    AccessDenied {
        /// User-facing description. Policy rejections arrive here as
        /// `Reason: {message}.`.
        hint: String,
    },

    /// Something failed on our side; details are logged, not rendered.
    #[error("server_error: {hint}")]
    ServerError {
        /// User-facing description with internals stripped.
        hint: String,
    },

    /// `prompt=none` was requested with `scope=openid`, but the supervisor
    /// always needs an interactive upstream login.
    #[error("login_required")]
    LoginRequired,

    /// Only `response_type=code` is supported.
    #[error("unsupported_response_type: {hint}")]
    UnsupportedResponseType {
        /// User-facing description.
        hint: String,
    },

    /// The `client_id` is missing or unknown. Fatal: with no trusted
    /// client there is no trusted `redirect_uri` to redirect to.
    #[error("invalid_client: {hint}")]
    InvalidClient {
        /// User-facing description.
        hint: String,
    },

    /// The `redirect_uri` is missing, unparseable, or not registered for
    /// the client. Fatal for the same reason.
    #[error("invalid_request: {hint}")]
    InvalidRedirectUri {
        /// User-facing description.
        hint: String,
    },
}

impl AuthorizeError {
    /// Create a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(hint: impl Into<String>) -> Self {
        Self::InvalidRequest { hint: hint.into() }
    }

    /// Create a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(hint: impl Into<String>) -> Self {
        Self::AccessDenied { hint: hint.into() }
    }

    /// Create a new `ServerError` error.
    #[must_use]
    pub fn server_error(hint: impl Into<String>) -> Self {
        Self::ServerError { hint: hint.into() }
    }

    /// Create a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(hint: impl Into<String>) -> Self {
        Self::InvalidClient { hint: hint.into() }
    }

    /// Create a new `InvalidRedirectUri` error.
    #[must_use]
    pub fn invalid_redirect_uri(hint: impl Into<String>) -> Self {
        Self::InvalidRedirectUri { hint: hint.into() }
    }

    /// The OAuth2 `error` code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } | Self::InvalidRedirectUri { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::ServerError { .. } => "server_error",
            Self::LoginRequired => "login_required",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::InvalidClient { .. } => "invalid_client",
        }
    }

    /// The OAuth2 `error_description` for this error: the hint when one
    /// was attached, otherwise a generic description of the code.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest { hint }
            | Self::AccessDenied { hint }
            | Self::ServerError { hint }
            | Self::UnsupportedResponseType { hint }
            | Self::InvalidClient { hint }
            | Self::InvalidRedirectUri { hint }
                if !hint.is_empty() =>
            {
                hint
            }
            Self::LoginRequired => "The Authorization Server requires End-User authentication.",
            Self::AccessDenied { .. } => {
                "The resource owner or authorization server denied the request."
            }
            Self::ServerError { .. } => {
                "The authorization server encountered an unexpected condition."
            }
            _ => "The request is missing a required parameter, includes an invalid parameter \
                  value, or is otherwise malformed.",
        }
    }

    /// Returns `true` when there is no trusted `redirect_uri` to carry the
    /// error back to, so the only safe response is a direct error page.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidClient { .. } | Self::InvalidRedirectUri { .. }
        )
    }
}

impl From<ProviderError> for AuthorizeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::FlowUnsupported { flow } => Self::access_denied(format!(
                "This identity provider does not support the {flow} flow."
            )),
            ProviderError::InvalidCredentials => Self::access_denied(
                "Username/password not accepted by the upstream identity provider.",
            ),
            ProviderError::Upstream { message } => {
                tracing::error!(error = %message, "upstream identity provider failed");
                Self::server_error("Unexpected error from the upstream identity provider.")
            }
        }
    }
}

impl From<LookupError> for AuthorizeError {
    fn from(err: LookupError) -> Self {
        Self::invalid_request(format!("\"pinniped_idp_name\" param error: {err}"))
    }
}

/// Type alias for authorize pipeline results.
pub type AuthorizeResult<T> = Result<T, AuthorizeError>;
