//! PKCE (RFC 7636) values for both sides of the federated handshake.
//!
//! The supervisor sits in the middle of two authorization-code exchanges
//! and therefore touches PKCE twice, in opposite roles:
//!
//! - **Downstream** (client → supervisor): the supervisor is the server.
//!   It accepts a `code_challenge` from the client, stores it with the
//!   issued authorization code, and verifies the verifier at the token
//!   endpoint. Only the `S256` method is accepted.
//! - **Upstream** (supervisor → external IdP): the supervisor is the
//!   client. It generates a fresh code verifier per browser login, carries
//!   it in the encrypted state parameter, and sends its `S256` challenge to
//!   the upstream authorization endpoint.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors validating downstream PKCE parameters.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// The client omitted the `code_challenge` parameter.
    #[error("code_challenge is required")]
    MissingChallenge,

    /// The challenge is not valid base64url or has the wrong length.
    #[error("code_challenge must be the base64url-encoded SHA-256 of the verifier")]
    MalformedChallenge,

    /// The client asked for a challenge method other than `S256`.
    #[error("code_challenge_method {0:?} is not supported, use S256")]
    UnsupportedMethod(String),
}

// =============================================================================
// Upstream code verifier
// =============================================================================

/// A PKCE code verifier generated by the supervisor for its upstream
/// authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkceCode(String);

impl PkceCode {
    /// Generate a fresh verifier: 32 random bytes, base64url (43 chars),
    /// which satisfies the RFC 7636 verifier alphabet and length rules.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The `S256` challenge for this verifier:
    /// `BASE64URL(SHA256(ASCII(verifier)))`.
    #[must_use]
    pub fn challenge(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// The verifier string, for the upstream token exchange.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Downstream code challenge
// =============================================================================

/// A validated downstream `code_challenge` as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeChallenge(String);

impl CodeChallenge {
    /// Validate the challenge and method parameters from an authorization
    /// request.
    ///
    /// # Errors
    ///
    /// Rejects a missing or malformed challenge and any method other than
    /// `S256` (including the downgraded `plain` method).
    pub fn parse(challenge: Option<&str>, method: Option<&str>) -> Result<Self, PkceError> {
        match method {
            Some("S256") => {}
            Some(other) => return Err(PkceError::UnsupportedMethod(other.to_string())),
            // RFC 7636 defaults a missing method to "plain", which is not
            // acceptable here.
            None => return Err(PkceError::UnsupportedMethod("plain".to_string())),
        }

        let challenge = challenge.ok_or(PkceError::MissingChallenge)?;
        match URL_SAFE_NO_PAD.decode(challenge) {
            // An S256 challenge is always a 32-byte digest.
            Ok(decoded) if decoded.len() == 32 => Ok(Self(challenge.to_string())),
            _ => Err(PkceError::MalformedChallenge),
        }
    }

    /// Returns `true` when `verifier` hashes to this challenge.
    #[must_use]
    pub fn matches_verifier(&self, verifier: &str) -> bool {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest) == self.0
    }

    /// The challenge string as submitted.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
