//! The upstream state parameter payload and per-login tokens.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::oauth::pkce::PkceCode;

/// Codec name binding values minted as upstream `state` parameters.
pub const UPSTREAM_STATE_PARAM_ENCODING_NAME: &str = "oidc-upstream-state-param";

/// Codec name binding values minted as CSRF cookies.
pub const CSRF_COOKIE_ENCODING_NAME: &str = "oidc-csrf-cookie";

/// Name of the CSRF double-submit cookie. The `__Host-` prefix makes the
/// browser enforce `Secure` and `Path=/` with no `Domain` attribute.
pub const CSRF_COOKIE_NAME: &str = "__Host-pinniped-csrf";

/// Version of the state parameter serialization. Bumped whenever the
/// payload shape changes so stale in-flight logins fail decode cleanly
/// instead of misparsing.
pub const UPSTREAM_STATE_PARAM_FORMAT_VERSION: &str = "2";

// =============================================================================
// Per-login tokens
// =============================================================================

/// The CSRF double-submit token shared between the cookie and the state
/// parameter within one user agent's authorize-then-callback sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate a fresh random token (32 bytes, hex).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The OIDC nonce sent to the upstream provider and expected back in its
/// ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh random nonce (32 bytes, hex).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The nonce value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// State parameter payload
// =============================================================================

/// Everything the upstream callback needs to finish the downstream
/// authorization, carried opaquely through the upstream provider.
///
/// Field names are single letters to keep the resulting `state` query
/// parameter short; some upstream providers cap its length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamStateParamData {
    /// The original authorization request form, re-encoded, with the
    /// IdP-selection parameters stripped.
    #[serde(rename = "p")]
    pub auth_params: String,

    /// Display name of the upstream provider this login went through.
    #[serde(rename = "u")]
    pub upstream_name: String,

    /// Provider type string (`oidc`, `ldap`, `activedirectory`, `github`).
    #[serde(rename = "t")]
    pub upstream_type: String,

    /// Nonce expected back from the upstream provider.
    #[serde(rename = "n")]
    pub nonce: Nonce,

    /// CSRF token that must match the double-submit cookie at callback.
    #[serde(rename = "c")]
    pub csrf_token: CsrfToken,

    /// PKCE verifier for the upstream token exchange.
    #[serde(rename = "k")]
    pub pkce_code: PkceCode,

    /// Serialization format version.
    #[serde(rename = "v")]
    pub format_version: String,
}
