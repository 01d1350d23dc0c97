//! In-memory cluster backing for tests and single-process runs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ClientError, ClientResult, FederationDomainClient, IdentityProviderLister};
use crate::resources::{
    FederationDomain, FederationDomainStatus, IdentityProviderKind, IdentityProviderResource,
};

/// In-memory implementation of the cluster seam.
///
/// Stores objects keyed by `{namespace}/{name}` and counts status writes so
/// tests can assert reconcile idempotence.
#[derive(Default)]
pub struct InMemoryCluster {
    federation_domains: RwLock<HashMap<String, FederationDomain>>,
    identity_providers: RwLock<HashMap<String, IdentityProviderResource>>,
    status_update_count: AtomicUsize,
}

fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl InMemoryCluster {
    /// Create an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a FederationDomain.
    pub fn upsert_federation_domain(&self, domain: FederationDomain) {
        let key = object_key(&domain.metadata.namespace, &domain.metadata.name);
        self.federation_domains
            .write()
            .expect("lock poisoned")
            .insert(key, domain);
    }

    /// Remove a FederationDomain.
    pub fn delete_federation_domain(&self, namespace: &str, name: &str) {
        self.federation_domains
            .write()
            .expect("lock poisoned")
            .remove(&object_key(namespace, name));
    }

    /// Insert or replace an identity provider resource.
    pub fn upsert_identity_provider(&self, idp: IdentityProviderResource) {
        let key = object_key(&idp.metadata.namespace, &idp.metadata.name);
        self.identity_providers
            .write()
            .expect("lock poisoned")
            .insert(key, idp);
    }

    /// Remove an identity provider resource.
    pub fn delete_identity_provider(&self, namespace: &str, name: &str) {
        self.identity_providers
            .write()
            .expect("lock poisoned")
            .remove(&object_key(namespace, name));
    }

    /// Fetch a FederationDomain as currently stored.
    #[must_use]
    pub fn federation_domain(&self, namespace: &str, name: &str) -> Option<FederationDomain> {
        self.federation_domains
            .read()
            .expect("lock poisoned")
            .get(&object_key(namespace, name))
            .cloned()
    }

    /// How many status writes have been performed, across all domains.
    #[must_use]
    pub fn status_update_count(&self) -> usize {
        self.status_update_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FederationDomainClient for InMemoryCluster {
    async fn list_federation_domains(&self) -> ClientResult<Vec<FederationDomain>> {
        let mut domains: Vec<FederationDomain> = self
            .federation_domains
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        // Listers return objects in a stable order.
        domains.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(domains)
    }

    async fn update_federation_domain_status(
        &self,
        namespace: &str,
        name: &str,
        status: FederationDomainStatus,
    ) -> ClientResult<()> {
        let mut domains = self.federation_domains.write().expect("lock poisoned");
        let domain = domains
            .get_mut(&object_key(namespace, name))
            .ok_or_else(|| ClientError::not_found("FederationDomain", namespace, name))?;
        domain.status = status;
        self.status_update_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl IdentityProviderLister for InMemoryCluster {
    async fn list_identity_providers(
        &self,
        namespace: &str,
    ) -> ClientResult<Vec<IdentityProviderResource>> {
        let mut idps: Vec<IdentityProviderResource> = self
            .identity_providers
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|idp| idp.metadata.namespace == namespace)
            .cloned()
            .collect();
        idps.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(idps)
    }

    async fn get_identity_provider(
        &self,
        kind: IdentityProviderKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Option<IdentityProviderResource>> {
        Ok(self
            .identity_providers
            .read()
            .expect("lock poisoned")
            .get(&object_key(namespace, name))
            .filter(|idp| idp.kind == kind)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FederationDomainSpec;

    fn domain(name: &str) -> FederationDomain {
        FederationDomain {
            metadata: crate::resources::ObjectMeta::named("supervisor", name),
            spec: FederationDomainSpec {
                issuer: format!("https://issuer.example.com/{name}"),
                ..Default::default()
            },
            status: FederationDomainStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_name() {
        let cluster = InMemoryCluster::new();
        cluster.upsert_federation_domain(domain("zeta"));
        cluster.upsert_federation_domain(domain("alpha"));

        let names: Vec<String> = cluster
            .list_federation_domains()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.metadata.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_status_updates_are_counted() {
        let cluster = InMemoryCluster::new();
        cluster.upsert_federation_domain(domain("demo"));
        assert_eq!(cluster.status_update_count(), 0);

        cluster
            .update_federation_domain_status("supervisor", "demo", FederationDomainStatus::default())
            .await
            .unwrap();
        assert_eq!(cluster.status_update_count(), 1);

        let err = cluster
            .update_federation_domain_status("supervisor", "missing", FederationDomainStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_identity_provider_checks_kind() {
        let cluster = InMemoryCluster::new();
        cluster.upsert_identity_provider(IdentityProviderResource::new(
            IdentityProviderKind::Ldap,
            "supervisor",
            "corp",
        ));

        let found = cluster
            .get_identity_provider(IdentityProviderKind::Ldap, "supervisor", "corp")
            .await
            .unwrap();
        assert!(found.is_some());

        let wrong_kind = cluster
            .get_identity_provider(IdentityProviderKind::Oidc, "supervisor", "corp")
            .await
            .unwrap();
        assert!(wrong_kind.is_none());
    }
}
