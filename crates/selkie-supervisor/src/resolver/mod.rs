//! FederationDomain reconciliation.
//!
//! The resolver turns operator-authored FederationDomain objects into
//! validated [`FederationDomainIssuer`] values, writes the outcome of every
//! validation back as status conditions, and publishes the valid subset to
//! the [`crate::registry`].
//!
//! ## Modules
//!
//! - [`issuer`] - Validated issuer value objects
//! - [`validator`] - Cross-domain issuer/TLS validation
//! - [`reconciler`] - The per-sync reconcile algorithm
//! - [`controller`] - Event-driven sync loop

pub mod controller;
pub mod issuer;
pub mod reconciler;
pub mod validator;

pub use controller::{
    ReconcileService, ReconcileServiceConfig, ResourceChange, ResourceChangeNotifier,
};
pub use issuer::{
    FederationDomainIdentityProvider, FederationDomainIssuer, IssuerError, validate_issuer_url,
};
pub use reconciler::{FederationDomainReconciler, ReconcileError};
pub use validator::CrossDomainConfigValidator;

// Condition types written to FederationDomain status.
pub(crate) mod condition_types {
    pub const READY: &str = "Ready";
    pub const ISSUER_URL_VALID: &str = "IssuerURLValid";
    pub const ISSUER_IS_UNIQUE: &str = "IssuerIsUnique";
    pub const ONE_TLS_SECRET_PER_ISSUER_HOSTNAME: &str = "OneTLSSecretPerIssuerHostname";
    pub const IDENTITY_PROVIDERS_FOUND: &str = "IdentityProvidersFound";
    pub const TRANSFORMS_EXPRESSIONS_VALID: &str = "TransformsExpressionsValid";
    pub const TRANSFORMS_EXAMPLES_PASSED: &str = "TransformsExamplesPassed";
}

// Condition reasons written to FederationDomain status.
pub(crate) mod condition_reasons {
    pub const SUCCESS: &str = "Success";
    pub const NOT_READY: &str = "NotReady";
    pub const UNABLE_TO_VALIDATE: &str = "UnableToValidate";
    pub const INVALID_ISSUER_URL: &str = "InvalidIssuerURL";
    pub const DUPLICATE_ISSUER: &str = "DuplicateIssuer";
    pub const DIFFERENT_SECRET_REFS_FOUND: &str = "DifferentSecretRefsFound";
    pub const LEGACY_CONFIGURATION_SUCCESS: &str = "LegacyConfigurationSuccess";
    pub const LEGACY_CONFIGURATION_IDENTITY_PROVIDER_NOT_FOUND: &str =
        "LegacyConfigurationIdentityProviderNotFound";
    pub const IDENTITY_PROVIDERS_OBJECT_REFS_NOT_FOUND: &str =
        "IdentityProvidersObjectRefsNotFound";
    pub const IDENTITY_PROVIDER_NOT_SPECIFIED: &str = "IdentityProviderNotSpecified";
    pub const DUPLICATE_DISPLAY_NAMES: &str = "DuplicateDisplayNames";
    pub const INVALID_TRANSFORMS_EXPRESSIONS: &str = "InvalidTransformsExpressions";
    pub const TRANSFORMS_EXAMPLES_FAILED: &str = "TransformsExamplesFailed";
}
