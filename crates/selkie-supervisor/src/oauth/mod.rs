//! OAuth2 machinery for the downstream authorization server.
//!
//! The authorization endpoint only touches this module through a narrow
//! surface: parse and validate an [`AuthorizeRequest`], issue an
//! authorization code, and render a success or error response. Token
//! endpoint concerns (code redemption, token minting) live elsewhere.
//!
//! ## Modules
//!
//! - [`clients`] - Registered downstream clients
//! - [`request`] - Authorization request parsing and validation
//! - [`pkce`] - PKCE values for both sides of the federated handshake
//! - [`store`] - Authorization code issuance and persistence
//! - [`response`] - Redirect and form-post response construction

pub mod clients;
pub mod pkce;
pub mod request;
pub mod response;
pub mod store;

pub use clients::{CLI_CLIENT_ID, Client, ClientRegistry};
pub use request::{AuthorizeRequest, RedirectContext, ResponseMode};
pub use store::{
    AuthCodeStore, AuthorizationCode, DownstreamSession, InMemoryAuthCodeStore,
    StoredAuthorization,
};
