//! Identity provider custom resources and CA bundle references.
//!
//! The supervisor only consumes identity provider resources for their
//! `{kind, namespace, name, uid}` identity. Everything else about an
//! upstream (endpoints, credentials, protocol settings) belongs to the
//! per-protocol controllers that populate the upstream provider cache.

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Errors constructing resource-model values.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// An object reference named a kind this supervisor does not know.
    #[error("unknown identity provider kind {kind:?}")]
    UnknownIdentityProviderKind {
        /// The unrecognized kind string.
        kind: String,
    },

    /// A certificate authority data source was missing a required field.
    #[error("certificate authority data source field {field} must not be empty")]
    EmptyCaSourceField {
        /// The offending field name.
        field: &'static str,
    },
}

/// The kinds of identity provider custom resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityProviderKind {
    /// An `OIDCIdentityProvider` resource.
    Oidc,
    /// An `LDAPIdentityProvider` resource.
    Ldap,
    /// An `ActiveDirectoryIdentityProvider` resource.
    ActiveDirectory,
    /// A `GitHubIdentityProvider` resource.
    GitHub,
}

impl IdentityProviderKind {
    /// All known kinds, in the order the legacy-mode census inspects them.
    pub const ALL: [Self; 4] = [Self::Oidc, Self::Ldap, Self::ActiveDirectory, Self::GitHub];

    /// The resource `kind` string as it appears in object references.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oidc => "OIDCIdentityProvider",
            Self::Ldap => "LDAPIdentityProvider",
            Self::ActiveDirectory => "ActiveDirectoryIdentityProvider",
            Self::GitHub => "GitHubIdentityProvider",
        }
    }

    /// Parse a resource `kind` string.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::UnknownIdentityProviderKind` for any other
    /// string. Unknown kinds are data errors reported on the referencing
    /// FederationDomain's status, never a panic.
    pub fn parse(kind: &str) -> Result<Self, ResourceError> {
        match kind {
            "OIDCIdentityProvider" => Ok(Self::Oidc),
            "LDAPIdentityProvider" => Ok(Self::Ldap),
            "ActiveDirectoryIdentityProvider" => Ok(Self::ActiveDirectory),
            "GitHubIdentityProvider" => Ok(Self::GitHub),
            other => Err(ResourceError::UnknownIdentityProviderKind {
                kind: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for IdentityProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An identity provider resource, reduced to the fields the federation
/// domain reconciler consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderResource {
    /// Object metadata; `name` and `uid` are what the reconciler reads.
    pub metadata: ObjectMeta,

    /// Which identity provider CRD this object belongs to.
    pub kind: IdentityProviderKind,
}

impl IdentityProviderResource {
    /// Convenience constructor for tests and fixtures.
    #[must_use]
    pub fn new(kind: IdentityProviderKind, namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::named(namespace, name),
            kind,
        }
    }
}

/// Where a certificate authority data source reads its bundle from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaSourceKind {
    /// A key inside a `Secret`.
    Secret,
    /// A key inside a `ConfigMap`.
    ConfigMap,
}

/// Uniform reference to a CA bundle stored in a Secret or ConfigMap.
///
/// The apiserver schema already requires all three fields, but the type
/// refuses empty values as well so in-process constructed references obey
/// the same contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthorityDataSource {
    /// Whether the bundle lives in a Secret or a ConfigMap.
    pub kind: CaSourceKind,

    /// Name of the Secret or ConfigMap.
    pub name: String,

    /// Key within the object whose value is the PEM bundle.
    pub key: String,
}

impl CertificateAuthorityDataSource {
    /// Create a validated CA data source reference.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::EmptyCaSourceField` when `name` or `key` is
    /// empty.
    pub fn new(
        kind: CaSourceKind,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self, ResourceError> {
        let name = name.into();
        let key = key.into();
        if name.is_empty() {
            return Err(ResourceError::EmptyCaSourceField { field: "name" });
        }
        if key.is_empty() {
            return Err(ResourceError::EmptyCaSourceField { field: "key" });
        }
        Ok(Self { kind, name, key })
    }
}
