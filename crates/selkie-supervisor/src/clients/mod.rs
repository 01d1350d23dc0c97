//! Cluster access seam for the reconciler.
//!
//! The reconciler never talks to an apiserver directly; it reads resources
//! and writes FederationDomain status through these traits. Production
//! wiring backs them with watch-driven caches, tests and single-process
//! deployments use [`InMemoryCluster`].

mod memory;

pub use memory::InMemoryCluster;

use async_trait::async_trait;

use crate::resources::{
    FederationDomain, FederationDomainStatus, IdentityProviderKind, IdentityProviderResource,
};

/// Errors from cluster reads and status writes.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The referenced object does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind.
        kind: String,
        /// Object namespace.
        namespace: String,
        /// Object name.
        name: String,
    },

    /// A status write raced a concurrent update; safe to retry.
    #[error("conflict writing {namespace}/{name}: {message}")]
    Conflict {
        /// Object namespace.
        namespace: String,
        /// Object name.
        name: String,
        /// Server-reported detail.
        message: String,
    },

    /// Any other apiserver failure.
    #[error("apiserver error: {message}")]
    Api {
        /// Server-reported detail.
        message: String,
    },
}

impl ClientError {
    /// Create a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Create a new `Api` error.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Returns `true` when the operation may be retried as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Api { .. })
    }
}

/// Type alias for cluster operation results.
pub type ClientResult<T> = Result<T, ClientError>;

/// Read access to FederationDomain objects plus status write-back.
#[async_trait]
pub trait FederationDomainClient: Send + Sync {
    /// List every FederationDomain in the supervisor's namespace.
    async fn list_federation_domains(&self) -> ClientResult<Vec<FederationDomain>>;

    /// Replace the status subresource of one FederationDomain.
    async fn update_federation_domain_status(
        &self,
        namespace: &str,
        name: &str,
        status: FederationDomainStatus,
    ) -> ClientResult<()>;
}

/// Read access to identity provider objects of every kind.
#[async_trait]
pub trait IdentityProviderLister: Send + Sync {
    /// List all identity provider resources, any kind, in a namespace.
    async fn list_identity_providers(
        &self,
        namespace: &str,
    ) -> ClientResult<Vec<IdentityProviderResource>>;

    /// Look up one identity provider by kind and name.
    ///
    /// Returns `Ok(None)` when no such object exists; `Err` is reserved for
    /// infrastructure failures.
    async fn get_identity_provider(
        &self,
        kind: IdentityProviderKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Option<IdentityProviderResource>>;
}
