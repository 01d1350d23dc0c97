//! The FederationDomain reconcile algorithm.
//!
//! One sync pass observes every FederationDomain and identity provider in
//! the supervisor's namespace, computes status conditions for each domain,
//! writes status back only when something changed, and publishes the set of
//! fully-valid issuers to the registry. A domain with any failing
//! validation keeps serving its previous published state only if it is
//! still valid; otherwise it simply drops out of the published set.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use selkie_transform::{
    TransformEngine, TransformKind, TransformationConstants, TransformationPipeline,
    TransformationResult,
};

use super::condition_reasons as reasons;
use super::condition_types as types;
use super::issuer::{FederationDomainIdentityProvider, FederationDomainIssuer};
use super::validator::CrossDomainConfigValidator;
use crate::clients::{ClientError, FederationDomainClient, IdentityProviderLister};
use crate::providers::ProviderType;
use crate::registry::FederationDomainRegistry;
use crate::resources::{
    Condition, ConditionStatus, ConstantType, FederationDomain, FederationDomainPhase,
    FederationDomainStatus, IdentityProviderKind, IdentityProviderRef, IdentityTransforms,
    TransformExample, merge_conditions,
};

/// Errors from one reconcile pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Listing FederationDomains failed; nothing was reconciled.
    #[error("failed to list FederationDomains: {0}")]
    List(#[source] ClientError),

    /// One or more status writes failed; the controller should retry.
    #[error("{0} FederationDomain status update(s) failed: {1}")]
    StatusUpdates(usize, String),
}

/// Reconciles FederationDomain objects into published issuers.
pub struct FederationDomainReconciler {
    domains: Arc<dyn FederationDomainClient>,
    identity_providers: Arc<dyn IdentityProviderLister>,
    registry: Arc<FederationDomainRegistry>,
    transform_engine: Arc<TransformEngine>,
    transform_budget: Duration,
    namespace: String,
}

impl FederationDomainReconciler {
    /// Create a reconciler for one supervisor namespace.
    #[must_use]
    pub fn new(
        domains: Arc<dyn FederationDomainClient>,
        identity_providers: Arc<dyn IdentityProviderLister>,
        registry: Arc<FederationDomainRegistry>,
        transform_engine: Arc<TransformEngine>,
        transform_budget: Duration,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            domains,
            identity_providers,
            registry,
            transform_engine,
            transform_budget,
            namespace: namespace.into(),
        }
    }

    /// Run one full reconcile pass.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::List` when the domain list itself cannot be
    /// read and `ReconcileError::StatusUpdates` when any status write
    /// failed. Validation failures are never errors; they become status
    /// conditions.
    pub async fn sync(&self) -> Result<(), ReconcileError> {
        let federation_domains = self
            .domains
            .list_federation_domains()
            .await
            .map_err(ReconcileError::List)?;

        let validator = CrossDomainConfigValidator::new(&federation_domains);
        let mut issuers: Vec<FederationDomainIssuer> = Vec::new();
        let mut update_errors: Vec<ClientError> = Vec::new();

        for domain in &federation_domains {
            let mut conditions: Vec<Condition> = Vec::with_capacity(8);
            validator.validate(domain, &mut conditions);

            let resolved = self.resolve_identity_providers(domain, &mut conditions).await;

            let issuer = self.construct_issuer(domain, resolved, &mut conditions);

            match self.update_status(domain, conditions).await {
                Ok(loadable) => {
                    if loadable && let Some(issuer) = issuer {
                        issuers.push(issuer);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        federation_domain = %domain.metadata.name,
                        error = %e,
                        "could not update FederationDomain status"
                    );
                    update_errors.push(e);
                }
            }
        }

        tracing::debug!(count = issuers.len(), "publishing federation domains");
        self.registry.set_federation_domains(issuers);

        if update_errors.is_empty() {
            Ok(())
        } else {
            let joined = update_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Err(ReconcileError::StatusUpdates(update_errors.len(), joined))
        }
    }

    /// Resolve the domain's identity providers, appending the
    /// `IdentityProvidersFound` and transform conditions.
    async fn resolve_identity_providers(
        &self,
        domain: &FederationDomain,
        conditions: &mut Vec<Condition>,
    ) -> ResolvedProviders {
        if domain.spec.identity_providers.is_empty() {
            return self.resolve_legacy_mode(conditions).await;
        }

        let mut providers: Vec<FederationDomainIdentityProvider> = Vec::new();
        let mut not_found: Vec<String> = Vec::new();
        let mut compile_failures: Vec<String> = Vec::new();
        let mut example_failures: Vec<String> = Vec::new();
        let mut seen_display_names: Vec<&str> = Vec::new();
        let mut duplicate_display_names: Vec<String> = Vec::new();

        for (index, idp_ref) in domain.spec.identity_providers.iter().enumerate() {
            if seen_display_names.contains(&idp_ref.display_name.as_str()) {
                duplicate_display_names.push(idp_ref.display_name.clone());
            }
            seen_display_names.push(idp_ref.display_name.as_str());

            let resolved_uid = self.resolve_object_ref(idp_ref, &domain.metadata.namespace).await;
            let Some((uid, provider_type)) = resolved_uid else {
                not_found.push(format!(
                    "IDP with displayName {:?} at index {}",
                    idp_ref.display_name, index
                ));
                continue;
            };

            let pipeline = match self.compile_transforms(&idp_ref.transforms, &idp_ref.display_name)
            {
                Ok(pipeline) => pipeline,
                Err(failures) => {
                    compile_failures.extend(failures);
                    continue;
                }
            };

            example_failures.extend(run_transform_examples(
                &pipeline,
                &idp_ref.transforms.examples,
                &idp_ref.display_name,
            ));

            providers.push(FederationDomainIdentityProvider {
                display_name: idp_ref.display_name.clone(),
                uid,
                provider_type,
                transforms: Arc::new(pipeline),
            });
        }

        if !duplicate_display_names.is_empty() {
            conditions.push(Condition::new(
                types::IDENTITY_PROVIDERS_FOUND,
                ConditionStatus::False,
                reasons::DUPLICATE_DISPLAY_NAMES,
                format!(
                    ".spec.identityProviders[].displayName contains duplicates: {}",
                    duplicate_display_names.join(", ")
                ),
            ));
        } else if !not_found.is_empty() {
            conditions.push(Condition::new(
                types::IDENTITY_PROVIDERS_FOUND,
                ConditionStatus::False,
                reasons::IDENTITY_PROVIDERS_OBJECT_REFS_NOT_FOUND,
                format!(
                    ".spec.identityProviders[].objectRef identifies resource(s) that cannot be found: {}",
                    not_found.join(", ")
                ),
            ));
        } else {
            conditions.push(Condition::new(
                types::IDENTITY_PROVIDERS_FOUND,
                ConditionStatus::True,
                reasons::SUCCESS,
                "the resources specified by .spec.identityProviders[].objectRef were found",
            ));
        }

        if compile_failures.is_empty() {
            conditions.push(Condition::new(
                types::TRANSFORMS_EXPRESSIONS_VALID,
                ConditionStatus::True,
                reasons::SUCCESS,
                "the transformation expressions compiled successfully",
            ));
        } else {
            conditions.push(Condition::new(
                types::TRANSFORMS_EXPRESSIONS_VALID,
                ConditionStatus::False,
                reasons::INVALID_TRANSFORMS_EXPRESSIONS,
                format!(
                    ".spec.identityProviders[].transforms.expressions[] contains invalid expressions: {}",
                    compile_failures.join("; ")
                ),
            ));
        }

        if example_failures.is_empty() {
            conditions.push(Condition::new(
                types::TRANSFORMS_EXAMPLES_PASSED,
                ConditionStatus::True,
                reasons::SUCCESS,
                "the transformation examples passed",
            ));
        } else {
            // Examples are advisory: this condition warns operators but does
            // not keep the domain from loading (see update_status).
            conditions.push(Condition::new(
                types::TRANSFORMS_EXAMPLES_PASSED,
                ConditionStatus::False,
                reasons::TRANSFORMS_EXAMPLES_FAILED,
                format!(
                    ".spec.identityProviders[].transforms.examples[] did not behave as expected: {}",
                    example_failures.join("; ")
                ),
            ));
        }

        ResolvedProviders {
            providers,
            default_provider: None,
        }
    }

    /// Legacy back-compat mode: no providers listed on the domain, adopt
    /// the namespace's sole identity provider as the default.
    async fn resolve_legacy_mode(&self, conditions: &mut Vec<Condition>) -> ResolvedProviders {
        let idps = match self
            .identity_providers
            .list_identity_providers(&self.namespace)
            .await
        {
            Ok(idps) => idps,
            Err(e) => {
                tracing::warn!(error = %e, "could not list identity providers");
                conditions.push(Condition::new(
                    types::IDENTITY_PROVIDERS_FOUND,
                    ConditionStatus::Unknown,
                    reasons::UNABLE_TO_VALIDATE,
                    "unable to list the identity provider resources in the namespace",
                ));
                return ResolvedProviders::default();
            }
        };

        match idps.len() {
            1 => {
                let idp = &idps[0];
                let default_provider = FederationDomainIdentityProvider {
                    display_name: idp.metadata.name.clone(),
                    uid: idp.metadata.uid.clone(),
                    provider_type: provider_type_for(idp.kind),
                    // No transforms can be declared without an explicit
                    // .spec.identityProviders entry, so the pipeline is
                    // always empty here.
                    transforms: Arc::new(TransformationPipeline::with_budget(
                        self.transform_engine.clone(),
                        TransformationConstants::new(),
                        self.transform_budget,
                    )),
                };
                conditions.push(Condition::new(
                    types::IDENTITY_PROVIDERS_FOUND,
                    ConditionStatus::True,
                    reasons::LEGACY_CONFIGURATION_SUCCESS,
                    format!(
                        "no resources were specified by .spec.identityProviders[].objectRef but exactly one \
                         identity provider resource has been found: using {:?} as identity provider: \
                         please explicitly list identity providers in .spec.identityProviders \
                         (this legacy configuration mode may be removed in a future version)",
                        idp.metadata.name
                    ),
                ));
                ResolvedProviders {
                    providers: vec![],
                    default_provider: Some(default_provider),
                }
            }
            0 => {
                conditions.push(Condition::new(
                    types::IDENTITY_PROVIDERS_FOUND,
                    ConditionStatus::False,
                    reasons::LEGACY_CONFIGURATION_IDENTITY_PROVIDER_NOT_FOUND,
                    "no resources were specified by .spec.identityProviders[].objectRef and no identity \
                     provider resources have been found: please create an identity provider resource",
                ));
                ResolvedProviders::default()
            }
            count => {
                conditions.push(Condition::new(
                    types::IDENTITY_PROVIDERS_FOUND,
                    ConditionStatus::False,
                    reasons::IDENTITY_PROVIDER_NOT_SPECIFIED,
                    format!(
                        "no resources were specified by .spec.identityProviders[].objectRef and {count} \
                         identity provider resources have been found: please update \
                         .spec.identityProviders to specify which identity providers \
                         this federation domain should use"
                    ),
                ));
                ResolvedProviders::default()
            }
        }
    }

    /// Look up one object reference, returning its UID and provider type.
    ///
    /// An unknown `kind` resolves to nothing, exactly like a missing
    /// object: both are operator data errors reported through the same
    /// not-found condition.
    async fn resolve_object_ref(
        &self,
        idp_ref: &IdentityProviderRef,
        namespace: &str,
    ) -> Option<(String, ProviderType)> {
        let kind = match IdentityProviderKind::parse(&idp_ref.object_ref.kind) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(
                    display_name = %idp_ref.display_name,
                    error = %e,
                    "identity provider objectRef has an unknown kind"
                );
                return None;
            }
        };

        match self
            .identity_providers
            .get_identity_provider(kind, namespace, &idp_ref.object_ref.name)
            .await
        {
            Ok(Some(idp)) => Some((idp.metadata.uid.clone(), provider_type_for(kind))),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    display_name = %idp_ref.display_name,
                    error = %e,
                    "could not look up identity provider objectRef"
                );
                None
            }
        }
    }

    /// Compile one provider's constants and expressions into a pipeline.
    fn compile_transforms(
        &self,
        transforms: &IdentityTransforms,
        display_name: &str,
    ) -> Result<TransformationPipeline, Vec<String>> {
        let mut constants = TransformationConstants::new();
        for constant in &transforms.constants {
            match constant.constant_type {
                ConstantType::String => {
                    constants.push_string(&constant.name, constant.string_value.clone());
                }
                ConstantType::StringList => {
                    constants.push_string_list(&constant.name, &constant.string_list_value);
                }
            }
        }

        let mut pipeline = TransformationPipeline::with_budget(
            self.transform_engine.clone(),
            constants,
            self.transform_budget,
        );
        let mut failures: Vec<String> = Vec::new();

        for (index, expression) in transforms.expressions.iter().enumerate() {
            let compiled = TransformKind::parse(&expression.expression_type, index).and_then(
                |kind| {
                    self.transform_engine.compile(
                        kind,
                        &expression.expression,
                        expression.message.clone(),
                        index,
                    )
                },
            );
            match compiled {
                Ok(transform) => pipeline.append(transform),
                Err(e) => {
                    tracing::warn!(
                        idp_display_name = %display_name,
                        transformation_index = index,
                        transformation_type = %expression.expression_type,
                        error = %e,
                        "error compiling identity transformation"
                    );
                    failures.push(format!("identityProvider {display_name:?}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(pipeline)
        } else {
            Err(failures)
        }
    }

    /// Build the issuer value, appending the `IssuerURLValid` condition.
    fn construct_issuer(
        &self,
        domain: &FederationDomain,
        resolved: ResolvedProviders,
        conditions: &mut Vec<Condition>,
    ) -> Option<FederationDomainIssuer> {
        let constructed = match resolved.default_provider {
            Some(default_provider) => FederationDomainIssuer::with_default_provider(
                &domain.spec.issuer,
                default_provider,
            ),
            None => FederationDomainIssuer::new(&domain.spec.issuer, resolved.providers),
        };

        match constructed {
            Ok(issuer) => {
                conditions.push(Condition::new(
                    types::ISSUER_URL_VALID,
                    ConditionStatus::True,
                    reasons::SUCCESS,
                    "spec.issuer is a valid URL",
                ));
                Some(issuer)
            }
            Err(e) => {
                conditions.push(Condition::new(
                    types::ISSUER_URL_VALID,
                    ConditionStatus::False,
                    reasons::INVALID_ISSUER_URL,
                    e.to_string(),
                ));
                None
            }
        }
    }

    /// Derive phase and the `Ready` summary, then write status only when it
    /// differs from the observed object. Returns whether the domain may be
    /// loaded into the registry.
    async fn update_status(
        &self,
        domain: &FederationDomain,
        mut conditions: Vec<Condition>,
    ) -> Result<bool, ClientError> {
        // Advisory conditions warn operators without blocking the domain.
        let blocking_failure = conditions
            .iter()
            .filter(|c| c.type_name != types::TRANSFORMS_EXAMPLES_PASSED)
            .any(|c| c.status != ConditionStatus::True);

        let phase = if blocking_failure {
            conditions.push(Condition::new(
                types::READY,
                ConditionStatus::False,
                reasons::NOT_READY,
                "the FederationDomain is not ready: see other conditions for details",
            ));
            FederationDomainPhase::Error
        } else {
            conditions.push(Condition::new(
                types::READY,
                ConditionStatus::True,
                reasons::SUCCESS,
                format!(
                    "the FederationDomain is ready and its endpoints are available: \
                     the discovery endpoint is {}/.well-known/openid-configuration",
                    domain.spec.issuer
                ),
            ));
            FederationDomainPhase::Ready
        };

        let status = FederationDomainStatus {
            phase,
            conditions: merge_conditions(
                conditions,
                &domain.status.conditions,
                domain.metadata.generation,
                OffsetDateTime::now_utc(),
            ),
        };

        if status != domain.status {
            self.domains
                .update_federation_domain_status(
                    &domain.metadata.namespace,
                    &domain.metadata.name,
                    status,
                )
                .await?;
        }

        Ok(!blocking_failure)
    }
}

/// Outcome of identity provider resolution for one domain.
#[derive(Default)]
struct ResolvedProviders {
    providers: Vec<FederationDomainIdentityProvider>,
    default_provider: Option<FederationDomainIdentityProvider>,
}

fn provider_type_for(kind: IdentityProviderKind) -> ProviderType {
    match kind {
        IdentityProviderKind::Oidc => ProviderType::Oidc,
        IdentityProviderKind::Ldap => ProviderType::Ldap,
        IdentityProviderKind::ActiveDirectory => ProviderType::ActiveDirectory,
        IdentityProviderKind::GitHub => ProviderType::GitHub,
    }
}

/// Dry-run the declared examples, returning a description of every
/// mismatch.
fn run_transform_examples(
    pipeline: &TransformationPipeline,
    examples: &[TransformExample],
    display_name: &str,
) -> Vec<String> {
    let mut failures = Vec::new();

    for (index, example) in examples.iter().enumerate() {
        let result = match pipeline.evaluate(&example.username, &example.groups) {
            Ok(result) => result,
            Err(e) => {
                failures.push(format!(
                    "identityProvider {display_name:?} example at index {index}: evaluation failed: {e}"
                ));
                continue;
            }
        };

        for failure in check_example_expectations(example, &result) {
            failures.push(format!(
                "identityProvider {display_name:?} example at index {index}: {failure}"
            ));
        }
    }

    if !failures.is_empty() {
        tracing::warn!(
            idp_display_name = %display_name,
            failures = failures.len(),
            "identity transformation examples failed"
        );
    }

    failures
}

fn check_example_expectations(
    example: &TransformExample,
    result: &TransformationResult,
) -> Vec<String> {
    let mut failures = Vec::new();
    let rejected = !result.authentication_allowed;

    match (example.expects.rejected, rejected) {
        (true, false) => {
            failures.push("expected authentication to be rejected but it was not".to_string());
        }
        (false, true) => {
            failures.push("expected authentication not to be rejected but it was rejected".to_string());
        }
        (true, true) => {
            // An empty expected message means the default policy message.
            let expected_message = if example.expects.message.is_empty() {
                selkie_transform::DEFAULT_POLICY_REJECTED_MESSAGE
            } else {
                example.expects.message.as_str()
            };
            if result.rejected_authentication_message.as_deref() != Some(expected_message) {
                failures.push(format!(
                    "expected rejection message {:?} but got {:?}",
                    expected_message,
                    result.rejected_authentication_message.as_deref().unwrap_or_default()
                ));
            }
        }
        (false, false) => {
            if example.expects.username != result.username {
                failures.push(format!(
                    "expected username {:?} but got {:?}",
                    example.expects.username, result.username
                ));
            }
            if example.expects.groups != result.groups {
                failures.push(format!(
                    "expected groups {:?} but got {:?}",
                    example.expects.groups, result.groups
                ));
            }
        }
    }

    failures
}
