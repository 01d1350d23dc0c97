//! The published set of valid federation domains.
//!
//! The reconciler is the single writer; every HTTP request is a reader.
//! Publication replaces an immutable snapshot behind one pointer swap, so
//! a request observes either the entire previous set or the entire new one
//! and no locks are held across I/O.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::providers::{ResolvedIdentityProvider, UpstreamProviderCache};
use crate::resolver::FederationDomainIssuer;

/// Errors resolving an identity provider for a request.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The request named no provider and the domain has no default.
    #[error("identity provider not found: this federation domain does not have a default identity provider")]
    NoDefaultProvider,

    /// No provider with the requested display name exists on the domain.
    #[error("did not find IDP with name {display_name:?}")]
    NotFound {
        /// The requested display name.
        display_name: String,
    },

    /// The provider is configured but its upstream connection is not ready.
    #[error("identity provider {display_name:?} is not currently available")]
    UpstreamNotReady {
        /// The requested display name.
        display_name: String,
    },
}

/// One published federation domain, as seen by a request.
///
/// Holds a reference into the snapshot that was current when the request
/// looked it up; later publications do not affect it.
#[derive(Clone)]
pub struct FederationDomainHandle {
    issuer: Arc<FederationDomainIssuer>,
    upstreams: Arc<UpstreamProviderCache>,
}

impl FederationDomainHandle {
    /// The validated issuer this handle serves.
    #[must_use]
    pub fn issuer(&self) -> &FederationDomainIssuer {
        &self.issuer
    }

    /// Whether this domain is in legacy back-compat mode.
    #[must_use]
    pub fn has_default_provider(&self) -> bool {
        self.issuer.default_provider().is_some()
    }

    /// Number of identity providers configured on this domain.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.issuer.providers().len()
    }

    /// Resolve the domain's default provider (back-compat mode only).
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NoDefaultProvider`] outside back-compat mode
    /// and [`LookupError::UpstreamNotReady`] when the backing upstream has
    /// no live connection.
    pub fn find_default_provider(&self) -> Result<ResolvedIdentityProvider, LookupError> {
        let provider = self
            .issuer
            .default_provider()
            .ok_or(LookupError::NoDefaultProvider)?;
        self.join_upstream(provider)
    }

    /// Resolve a provider by the display name a client requested.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] for unknown display names and
    /// [`LookupError::UpstreamNotReady`] when the backing upstream has no
    /// live connection.
    pub fn find_provider_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<ResolvedIdentityProvider, LookupError> {
        let provider = self
            .issuer
            .provider_by_display_name(display_name)
            .ok_or_else(|| LookupError::NotFound {
                display_name: display_name.to_string(),
            })?;
        self.join_upstream(provider)
    }

    fn join_upstream(
        &self,
        provider: &crate::resolver::FederationDomainIdentityProvider,
    ) -> Result<ResolvedIdentityProvider, LookupError> {
        let upstream =
            self.upstreams
                .get(&provider.uid)
                .ok_or_else(|| LookupError::UpstreamNotReady {
                    display_name: provider.display_name.clone(),
                })?;
        Ok(ResolvedIdentityProvider::new(
            provider.display_name.clone(),
            provider.transforms.clone(),
            upstream,
        ))
    }
}

/// Thread-safe registry of the currently published federation domains.
pub struct FederationDomainRegistry {
    upstreams: Arc<UpstreamProviderCache>,
    snapshot: RwLock<Arc<HashMap<String, Arc<FederationDomainIssuer>>>>,
}

impl FederationDomainRegistry {
    /// Create an empty registry joined to an upstream provider cache.
    #[must_use]
    pub fn new(upstreams: Arc<UpstreamProviderCache>) -> Self {
        Self {
            upstreams,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Replace the published set. Called once per reconcile; passing an
    /// empty vector unpublishes everything.
    pub fn set_federation_domains(&self, issuers: Vec<FederationDomainIssuer>) {
        let next: HashMap<String, Arc<FederationDomainIssuer>> = issuers
            .into_iter()
            .map(|issuer| (issuer.issuer_key().to_string(), Arc::new(issuer)))
            .collect();
        *self.snapshot.write().expect("lock poisoned") = Arc::new(next);
    }

    /// Look up a published domain by its issuer key
    /// (`scheme://lowercase(host[:port])/path`).
    #[must_use]
    pub fn find_by_issuer_key(&self, issuer_key: &str) -> Option<FederationDomainHandle> {
        let snapshot = self.snapshot.read().expect("lock poisoned").clone();
        snapshot.get(issuer_key).map(|issuer| FederationDomainHandle {
            issuer: issuer.clone(),
            upstreams: self.upstreams.clone(),
        })
    }

    /// Number of currently published domains.
    #[must_use]
    pub fn federation_domain_count(&self) -> usize {
        self.snapshot.read().expect("lock poisoned").len()
    }
}
