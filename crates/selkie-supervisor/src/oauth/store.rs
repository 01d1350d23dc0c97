//! Authorization code issuance and persistence.
//!
//! Only the browserless flow issues codes from the authorize endpoint
//! directly; the browser flow defers code issuance to the upstream
//! callback handler. Both persist through the same store so the token
//! endpoint can redeem either.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::pkce::CodeChallenge;
use crate::providers::{LoginExtras, ProviderType, UpstreamIdentity};

/// An opaque, single-use authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    /// Generate a fresh code: 32 random bytes, hex, with a recognizable
    /// prefix so leaked values can be attributed in logs.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("sk_ac_{}", hex::encode(bytes)))
    }

    /// The code value sent to the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The downstream session minted for a successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamSession {
    /// Identity asserted by the upstream provider, pre-transformation.
    pub upstream_identity: UpstreamIdentity,

    /// Provider-specific extras carried through the login.
    pub login_extras: LoginExtras,

    /// Username after identity transformations.
    pub username: String,

    /// Groups after identity transformations.
    pub groups: Vec<String>,

    /// Scopes granted to this session.
    pub granted_scopes: Vec<String>,

    /// The downstream client the session belongs to.
    pub client_id: String,

    /// Display name of the provider the user logged in through.
    pub provider_display_name: String,

    /// Protocol family of that provider.
    pub provider_type: ProviderType,
}

/// A persisted authorization awaiting redemption at the token endpoint.
#[derive(Debug, Clone)]
pub struct StoredAuthorization {
    /// The issued code.
    pub code: AuthorizationCode,

    /// The session the code will redeem into.
    pub session: DownstreamSession,

    /// Redirect URI the code was issued for; must match at redemption.
    pub redirect_uri: String,

    /// Downstream PKCE challenge; the verifier must match at redemption.
    pub code_challenge: CodeChallenge,

    /// When the code stops being redeemable.
    pub expires_at: Instant,
}

/// Persistence for issued authorization codes.
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    /// Persist a freshly issued authorization.
    async fn store(&self, authorization: StoredAuthorization);

    /// Redeem a code: returns the authorization exactly once, and never
    /// after expiry.
    async fn take(&self, code: &str) -> Option<StoredAuthorization>;
}

/// In-memory authorization code store.
#[derive(Default)]
pub struct InMemoryAuthCodeStore {
    codes: Mutex<HashMap<String, StoredAuthorization>>,
}

impl InMemoryAuthCodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of codes currently pending redemption.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.codes.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl AuthCodeStore for InMemoryAuthCodeStore {
    async fn store(&self, authorization: StoredAuthorization) {
        self.codes
            .lock()
            .expect("lock poisoned")
            .insert(authorization.code.as_str().to_string(), authorization);
    }

    async fn take(&self, code: &str) -> Option<StoredAuthorization> {
        let taken = self.codes.lock().expect("lock poisoned").remove(code)?;
        (taken.expires_at > Instant::now()).then_some(taken)
    }
}

/// Issue and persist a new authorization code for a session.
pub async fn issue_authorization_code(
    store: &dyn AuthCodeStore,
    session: DownstreamSession,
    redirect_uri: &str,
    code_challenge: CodeChallenge,
    lifetime: Duration,
) -> AuthorizationCode {
    let code = AuthorizationCode::generate();
    tracing::debug!(
        client_id = %session.client_id,
        username = %session.username,
        provider = %session.provider_display_name,
        "issuing authorization code"
    );
    store
        .store(StoredAuthorization {
            code: code.clone(),
            session,
            redirect_uri: redirect_uri.to_string(),
            code_challenge,
            expires_at: Instant::now() + lifetime,
        })
        .await;
    code
}
