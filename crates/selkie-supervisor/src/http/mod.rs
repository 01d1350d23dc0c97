//! HTTP surface of the supervisor's federation domain endpoints.
//!
//! ## Modules
//!
//! - [`authorize`] - The `/oauth2/authorize` endpoint
//! - [`security`] - Response security headers

pub mod authorize;
pub mod security;

use axum::Router;

pub use authorize::AuthorizeState;

/// Suffix of the authorization endpoint path under each issuer.
pub const AUTHORIZE_ENDPOINT_PATH: &str = "/oauth2/authorize";

/// Suffix of the identity provider chooser endpoint path under each issuer.
pub const CHOOSE_IDP_ENDPOINT_PATH: &str = "/choose_identity_provider";

/// Header carrying the username for the browserless flow.
pub const AUTHORIZE_USERNAME_HEADER: &str = "Pinniped-Username";

/// Header carrying the password for the browserless flow.
pub const AUTHORIZE_PASSWORD_HEADER: &str = "Pinniped-Password";

/// Query/form parameter naming the identity provider to log in with.
pub const IDP_NAME_PARAM: &str = "pinniped_idp_name";

/// Informational query/form parameter naming the provider's type. Parsed
/// and stripped, but never used for resolution.
pub const IDP_TYPE_PARAM: &str = "pinniped_idp_type";

/// Build the router serving every published federation domain.
///
/// Issuers are path-scoped, so routing is a wildcard: the handler matches
/// the request's host and path prefix against the published issuer set and
/// answers 404 for anything it does not serve.
pub fn create_router(state: AuthorizeState) -> Router {
    Router::new()
        .fallback(authorize::authorize_handler)
        .layer(axum::middleware::from_fn(security::security_headers))
        .with_state(state)
}
