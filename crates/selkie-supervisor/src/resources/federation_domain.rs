//! The FederationDomain custom resource.

use serde::{Deserialize, Serialize};

use super::{Condition, ObjectMeta};

/// A FederationDomain binds an issuer URL to an ordered set of upstream
/// identity providers and their identity transformations.
///
/// Created and mutated by cluster operators; the supervisor writes back
/// only the `status` subresource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FederationDomain {
    /// Object metadata.
    pub metadata: ObjectMeta,

    /// Operator-authored configuration.
    pub spec: FederationDomainSpec,

    /// Supervisor-written status.
    pub status: FederationDomainStatus,
}

/// Operator-authored FederationDomain configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FederationDomainSpec {
    /// The OAuth2/OIDC issuer URL this domain serves. Must be an absolute
    /// `https` URL with a non-empty host and no query or fragment.
    pub issuer: String,

    /// TLS serving certificate reference for the issuer hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<FederationDomainTlsSpec>,

    /// Upstream identity providers available through this domain, in the
    /// order they should be offered. An empty list enables the legacy
    /// single-provider back-compat mode.
    pub identity_providers: Vec<IdentityProviderRef>,
}

/// Reference to the Secret holding the TLS serving certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FederationDomainTlsSpec {
    /// Name of a Secret of type `kubernetes.io/tls` in the same namespace.
    pub secret_name: String,
}

/// One upstream identity provider made available through a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityProviderRef {
    /// Name shown to end users and used as the `pinniped_idp_name` value.
    /// Must be unique within one FederationDomain.
    pub display_name: String,

    /// Typed reference to the identity provider resource.
    pub object_ref: ObjectRef,

    /// Identity transformations applied after each successful upstream
    /// login through this provider.
    pub transforms: IdentityTransforms,
}

/// Typed reference to another object in the same namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectRef {
    /// API group of the referent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// Kind of the referent, e.g. `OIDCIdentityProvider`.
    pub kind: String,

    /// Name of the referent.
    pub name: String,
}

/// Declared constants, expressions, and examples for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityTransforms {
    /// Named constants visible to every expression.
    pub constants: Vec<TransformConstant>,

    /// Ordered transformation expressions.
    pub expressions: Vec<TransformExpressionSpec>,

    /// Illustrative examples, dry-run at reconcile time.
    pub examples: Vec<TransformExample>,
}

/// The declared type of a transformation constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstantType {
    /// A single string value.
    #[default]
    #[serde(rename = "string")]
    String,
    /// A list of string values.
    #[serde(rename = "stringList")]
    StringList,
}

/// A named constant available to transformation expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformConstant {
    /// Constant name, referenced as `strConst.<name>` or
    /// `strListConst.<name>` in expressions.
    pub name: String,

    /// Which of the value fields is populated.
    #[serde(rename = "type")]
    pub constant_type: ConstantType,

    /// Value when `type` is `string`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub string_value: String,

    /// Value when `type` is `stringList`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub string_list_value: Vec<String>,
}

/// One transformation expression declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformExpressionSpec {
    /// Expression kind: `username/v1`, `groups/v1`, or `policy/v1`.
    #[serde(rename = "type")]
    pub expression_type: String,

    /// The expression source text.
    pub expression: String,

    /// Rejection message for `policy/v1` expressions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An example identity run through the pipeline at reconcile time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformExample {
    /// Example upstream username.
    pub username: String,

    /// Example upstream group names.
    pub groups: Vec<String>,

    /// What the pipeline is expected to produce for this input.
    pub expects: TransformExampleExpects,
}

/// Expected pipeline outcome for a [`TransformExample`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformExampleExpects {
    /// Whether the authentication should be rejected.
    pub rejected: bool,

    /// Expected rejection message; empty means the default policy message.
    pub message: String,

    /// Expected transformed username when allowed.
    pub username: String,

    /// Expected transformed groups when allowed.
    pub groups: Vec<String>,
}

/// Coarse readiness phase derived from the conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FederationDomainPhase {
    /// Not yet reconciled.
    #[default]
    Pending,
    /// All conditions are `True`; the domain is serving.
    Ready,
    /// At least one condition is not `True`; the domain is not loaded.
    Error,
}

/// Supervisor-written FederationDomain status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FederationDomainStatus {
    /// Coarse readiness phase.
    pub phase: FederationDomainPhase,

    /// Detailed per-validation conditions.
    pub conditions: Vec<Condition>,
}
