//! Resource model for the supervisor's custom resources.
//!
//! These types mirror the `v1alpha1` custom resources as stored in the
//! cluster. The supervisor reads them through the [`crate::clients`] seam
//! and only ever writes back `status.phase` and `status.conditions` on
//! FederationDomain objects.
//!
//! Field names serialize in the camelCase wire form used by the apiserver.

mod conditions;
mod federation_domain;
mod identity_provider;

pub use conditions::{Condition, ConditionStatus, had_error_condition, merge_conditions};
pub use federation_domain::{
    ConstantType, FederationDomain, FederationDomainPhase, FederationDomainSpec,
    FederationDomainStatus, FederationDomainTlsSpec, IdentityProviderRef, IdentityTransforms,
    ObjectRef, TransformConstant, TransformExample, TransformExampleExpects,
    TransformExpressionSpec,
};
pub use identity_provider::{
    CaSourceKind, CertificateAuthorityDataSource, IdentityProviderKind, IdentityProviderResource,
    ResourceError,
};

use serde::{Deserialize, Serialize};

/// The subset of Kubernetes object metadata the supervisor consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    /// Object name, unique per namespace and kind.
    pub name: String,

    /// Namespace the object lives in.
    pub namespace: String,

    /// Cluster-assigned unique identifier, stable across updates.
    pub uid: String,

    /// Spec generation, incremented by the apiserver on each spec change.
    pub generation: i64,
}

impl ObjectMeta {
    /// Convenience constructor for tests and fixtures.
    #[must_use]
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: format!("uid-{namespace}-{name}"),
            generation: 1,
        }
    }
}
