//! Resolved upstream identity provider capability.
//!
//! The authorization endpoint is agnostic to how an upstream speaks its
//! protocol. Per-protocol controllers (out of scope here) maintain live
//! upstream connections and register them in the [`UpstreamProviderCache`]
//! keyed by the resource UID; the reconciler independently publishes which
//! display names a federation domain maps to which UIDs. At request time
//! the two are joined into a [`ResolvedIdentityProvider`], the only view of
//! an upstream the authorization endpoint ever sees.

pub mod testing;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use selkie_transform::TransformationPipeline;

use crate::oauth::pkce::PkceCode;
use crate::state::Nonce;

/// Errors from upstream provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider cannot participate in the requested flow, e.g. a
    /// password grant against an upstream that only supports redirects.
    #[error("this identity provider does not support the {flow} flow")]
    FlowUnsupported {
        /// Human-readable flow name for the access_denied hint.
        flow: &'static str,
    },

    /// The upstream rejected the submitted credentials.
    #[error("username/password not accepted by the upstream identity provider")]
    InvalidCredentials,

    /// The upstream failed for reasons other than bad credentials.
    #[error("upstream identity provider error: {message}")]
    Upstream {
        /// Diagnostic detail, logged but never sent to the client.
        message: String,
    },
}

impl ProviderError {
    /// Create a new `Upstream` error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

/// The protocol family of an upstream provider, used as the session type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// An upstream OIDC provider.
    Oidc,
    /// An upstream LDAP directory.
    Ldap,
    /// An upstream Active Directory.
    #[serde(rename = "activedirectory")]
    ActiveDirectory,
    /// An upstream GitHub organization.
    GitHub,
}

impl ProviderType {
    /// The wire string stored in sessions and the upstream state param.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oidc => "oidc",
            Self::Ldap => "ldap",
            Self::ActiveDirectory => "activedirectory",
            Self::GitHub => "github",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The identity an upstream provider asserted after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamIdentity {
    /// Username as asserted by the upstream, before transformations.
    pub upstream_username: String,

    /// Group memberships as asserted by the upstream, before
    /// transformations. Empty when groups were ignored.
    pub upstream_groups: Vec<String>,

    /// Stable upstream subject identifier, recorded in the session.
    pub subject: String,
}

/// Provider-specific extras attached to a login, opaque to the
/// authorization endpoint and stored with the downstream session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginExtras {
    /// Additional claims the provider wants carried downstream.
    pub extra_claims: serde_json::Map<String, serde_json::Value>,
}

/// Per-login values the browser flow hands to the upstream redirect.
#[derive(Debug, Clone)]
pub struct UpstreamAuthorizeRequestState {
    /// The encoded, authenticated `state` parameter value.
    pub encoded_state_param: String,

    /// Nonce to send upstream.
    pub nonce: Nonce,

    /// PKCE verifier whose challenge is sent upstream.
    pub pkce: PkceCode,
}

/// The capability an upstream connection exposes to the supervisor.
///
/// Implementations must be safe for concurrent calls; one connection serves
/// many in-flight logins.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// The upstream resource's name.
    fn name(&self) -> &str;

    /// The upstream resource's UID, the cache key.
    fn uid(&self) -> &str;

    /// Which protocol family this upstream speaks.
    fn provider_type(&self) -> ProviderType;

    /// Build the upstream authorization URL for a browser login.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::FlowUnsupported` when the upstream has no
    /// browser-based flow.
    fn upstream_authorize_redirect_url(
        &self,
        state: &UpstreamAuthorizeRequestState,
        downstream_issuer: &str,
    ) -> Result<Url, ProviderError>;

    /// Authenticate a username/password pair without a browser.
    ///
    /// `ignore_groups` is set when the client did not request the groups
    /// scope, letting directory providers skip membership queries.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::FlowUnsupported` when the upstream has no
    /// password-based flow, `InvalidCredentials` on rejection, and
    /// `Upstream` for infrastructure failures.
    async fn login(
        &self,
        username: &str,
        password: &str,
        ignore_groups: bool,
    ) -> Result<(UpstreamIdentity, LoginExtras), ProviderError>;
}

// =============================================================================
// Upstream provider cache
// =============================================================================

/// Live upstream connections, keyed by resource UID.
///
/// Populated by the per-protocol upstream controllers; read by the
/// federation domain registry when resolving a display name for a request.
#[derive(Default)]
pub struct UpstreamProviderCache {
    providers: RwLock<HashMap<String, Arc<dyn UpstreamProvider>>>,
}

impl UpstreamProviderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider registered under its UID.
    pub fn set(&self, provider: Arc<dyn UpstreamProvider>) {
        let uid = provider.uid().to_string();
        self.providers
            .write()
            .expect("lock poisoned")
            .insert(uid, provider);
    }

    /// Remove the provider registered under `uid`.
    pub fn remove(&self, uid: &str) {
        self.providers.write().expect("lock poisoned").remove(uid);
    }

    /// Look up a provider by UID.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<Arc<dyn UpstreamProvider>> {
        self.providers
            .read()
            .expect("lock poisoned")
            .get(uid)
            .cloned()
    }
}

// =============================================================================
// Resolved provider
// =============================================================================

/// An upstream provider as seen through one federation domain: the live
/// connection joined with the domain's display name and compiled
/// transformation pipeline.
#[derive(Clone)]
pub struct ResolvedIdentityProvider {
    display_name: String,
    transforms: Arc<TransformationPipeline>,
    upstream: Arc<dyn UpstreamProvider>,
}

impl ResolvedIdentityProvider {
    /// Join a live upstream with its per-domain configuration.
    #[must_use]
    pub fn new(
        display_name: String,
        transforms: Arc<TransformationPipeline>,
        upstream: Arc<dyn UpstreamProvider>,
    ) -> Self {
        Self {
            display_name,
            transforms,
            upstream,
        }
    }

    /// The display name clients select this provider by.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The provider type recorded in sessions.
    #[must_use]
    pub fn session_provider_type(&self) -> ProviderType {
        self.upstream.provider_type()
    }

    /// The domain's transformation pipeline for this provider.
    #[must_use]
    pub fn transforms(&self) -> &TransformationPipeline {
        &self.transforms
    }

    /// Build the upstream authorization URL for a browser login.
    ///
    /// # Errors
    ///
    /// See [`UpstreamProvider::upstream_authorize_redirect_url`].
    pub fn upstream_authorize_redirect_url(
        &self,
        state: &UpstreamAuthorizeRequestState,
        downstream_issuer: &str,
    ) -> Result<Url, ProviderError> {
        self.upstream
            .upstream_authorize_redirect_url(state, downstream_issuer)
    }

    /// Authenticate a username/password pair without a browser.
    ///
    /// # Errors
    ///
    /// See [`UpstreamProvider::login`].
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ignore_groups: bool,
    ) -> Result<(UpstreamIdentity, LoginExtras), ProviderError> {
        self.upstream.login(username, password, ignore_groups).await
    }
}
