//! Symmetric authenticated codec for redirect-carried state.
//!
//! The encoding is a keyed-HMAC envelope over a JSON serialization:
//!
//! ```text
//! base64url(payload) "." base64url(HMAC-SHA256(key, codec_name || 0x00 || payload))
//! ```
//!
//! The codec name is mixed into the MAC input, which binds every value to
//! the purpose it was minted for: a CSRF cookie can never be replayed as an
//! upstream state parameter or vice versa.
//!
//! # Key rotation
//!
//! A codec holds one active signing key and any number of older
//! verification keys. Encoding always uses the active key; decoding tries
//! the active key first and then each older key. Callers treat any decode
//! failure as "value absent" - a client holding a cookie signed by a long-
//! retired key simply gets a fresh one.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the codec name and the payload in the MAC input.
/// Codec names never contain NUL, so the concatenation is unambiguous.
const MAC_DOMAIN_SEPARATOR: u8 = 0;

/// Errors from encoding or decoding authenticated state.
///
/// Decode errors are deliberately coarse: the handler treats every decode
/// failure the same way (value absent) and never echoes details to the
/// client.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload could not be serialized.
    #[error("failed to serialize state payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The encoded value is structurally invalid.
    #[error("encoded value is malformed")]
    Malformed,

    /// No configured key verifies the value.
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Signing and verification key material for a [`StateCodec`].
#[derive(Clone)]
pub struct CodecKeys {
    /// The key new values are signed with.
    pub signing_key: Vec<u8>,

    /// Previously active keys still accepted for verification.
    pub verification_keys: Vec<Vec<u8>>,
}

impl CodecKeys {
    /// Keys with a single active signing key and no rotation history.
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            verification_keys: Vec::new(),
        }
    }

    /// Add an older key that remains valid for verification.
    #[must_use]
    pub fn with_verification_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.verification_keys.push(key.into());
        self
    }
}

/// Symmetric authenticated encoder/decoder for redirect-carried state.
#[derive(Clone)]
pub struct StateCodec {
    keys: CodecKeys,
}

impl StateCodec {
    /// Create a codec from key material.
    #[must_use]
    pub fn new(keys: CodecKeys) -> Self {
        Self { keys }
    }

    /// Encode and authenticate a payload under the given codec name.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Serialize` when the payload cannot be
    /// serialized.
    pub fn encode<T: Serialize>(&self, codec_name: &str, value: &T) -> Result<String, CodecError> {
        let payload = serde_json::to_vec(value)?;
        let tag = compute_tag(&self.keys.signing_key, codec_name, &payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify and decode a value previously produced by [`encode`] under
    /// the same codec name.
    ///
    /// Verification tries the active signing key first, then each rotated
    /// verification key.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Malformed` for structural problems and
    /// `CodecError::InvalidSignature` when no key verifies the value or the
    /// codec name does not match the one used at encode time.
    ///
    /// [`encode`]: Self::encode
    pub fn decode<T: DeserializeOwned>(
        &self,
        codec_name: &str,
        encoded: &str,
    ) -> Result<T, CodecError> {
        let (payload_b64, tag_b64) = encoded.split_once('.').ok_or(CodecError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| CodecError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| CodecError::Malformed)?;

        let verified = std::iter::once(&self.keys.signing_key)
            .chain(self.keys.verification_keys.iter())
            .any(|key| verify_tag(key, codec_name, &payload, &tag));
        if !verified {
            return Err(CodecError::InvalidSignature);
        }

        serde_json::from_slice(&payload).map_err(|_| CodecError::Malformed)
    }
}

fn mac_for(key: &[u8], codec_name: &str, payload: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(codec_name.as_bytes());
    mac.update(&[MAC_DOMAIN_SEPARATOR]);
    mac.update(payload);
    mac
}

fn compute_tag(key: &[u8], codec_name: &str, payload: &[u8]) -> Vec<u8> {
    mac_for(key, codec_name, payload).finalize().into_bytes().to_vec()
}

fn verify_tag(key: &[u8], codec_name: &str, payload: &[u8], tag: &[u8]) -> bool {
    // verify_slice is constant-time.
    mac_for(key, codec_name, payload).verify_slice(tag).is_ok()
}
