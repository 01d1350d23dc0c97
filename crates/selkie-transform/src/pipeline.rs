//! Ordered pipeline of compiled identity transformations.
//!
//! A pipeline is built once at reconcile time from an identity provider's
//! declared constants and expressions, then shared by every login that
//! flows through that provider. Evaluation is a pure function of
//! `(username, groups, constants)`: the same inputs produce the same result
//! across process restarts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Map};

use crate::engine::{CompiledTransform, TransformEngine, TransformKind};
use crate::error::TransformError;

/// Rejection message used when a `policy/v1` expression returns `false`
/// without a configured message.
pub const DEFAULT_POLICY_REJECTED_MESSAGE: &str =
    "Authentication was rejected by a configured policy";

/// Wall-clock budget shared by the whole pipeline evaluation, unless the
/// supervisor configuration overrides it.
pub const DEFAULT_EVALUATION_BUDGET: Duration = Duration::from_secs(5);

// =============================================================================
// Constants Table
// =============================================================================

/// Named constants visible to every expression in a pipeline.
///
/// Constants are declared on the FederationDomain alongside the expressions
/// and are frozen when the pipeline is built.
#[derive(Debug, Clone, Default)]
pub struct TransformationConstants {
    string_constants: Map,
    string_list_constants: Map,
}

impl TransformationConstants {
    /// Create an empty constants table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a string constant, visible as `strConst.<name>`.
    pub fn push_string(&mut self, name: &str, value: impl Into<String>) {
        self.string_constants
            .insert(name.into(), Dynamic::from(value.into()));
    }

    /// Declare a string-list constant, visible as `strListConst.<name>`.
    pub fn push_string_list(&mut self, name: &str, values: &[String]) {
        let list: rhai::Array = values.iter().map(|v| Dynamic::from(v.clone())).collect();
        self.string_list_constants
            .insert(name.into(), Dynamic::from(list));
    }
}

// =============================================================================
// Evaluation Result
// =============================================================================

/// Outcome of evaluating a pipeline against an upstream identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationResult {
    /// Whether the authentication may proceed.
    pub authentication_allowed: bool,

    /// Rejection message when a policy expression denied the login.
    pub rejected_authentication_message: Option<String>,

    /// The (possibly rewritten) username.
    pub username: String,

    /// The (possibly rewritten) group names.
    pub groups: Vec<String>,
}

impl TransformationResult {
    fn allowed(username: String, groups: Vec<String>) -> Self {
        Self {
            authentication_allowed: true,
            rejected_authentication_message: None,
            username,
            groups,
        }
    }

    fn rejected(message: String, username: String, groups: Vec<String>) -> Self {
        Self {
            authentication_allowed: false,
            rejected_authentication_message: Some(message),
            username,
            groups,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// An immutable, ordered sequence of compiled transformations plus the
/// frozen constants they see.
///
/// An empty pipeline is valid and acts as the identity function; the
/// back-compat federation domain mode uses one.
pub struct TransformationPipeline {
    engine: Arc<TransformEngine>,
    constants: TransformationConstants,
    transforms: Vec<CompiledTransform>,
    budget: Duration,
}

impl TransformationPipeline {
    /// Create an empty pipeline with the default evaluation budget.
    #[must_use]
    pub fn new(engine: Arc<TransformEngine>, constants: TransformationConstants) -> Self {
        Self::with_budget(engine, constants, DEFAULT_EVALUATION_BUDGET)
    }

    /// Create an empty pipeline with a custom evaluation budget.
    #[must_use]
    pub fn with_budget(
        engine: Arc<TransformEngine>,
        constants: TransformationConstants,
        budget: Duration,
    ) -> Self {
        Self {
            engine,
            constants,
            transforms: Vec::new(),
            budget,
        }
    }

    /// Append a compiled transformation to the end of the pipeline.
    pub fn append(&mut self, transform: CompiledTransform) {
        self.transforms.push(transform);
    }

    /// Number of transformations in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns `true` if the pipeline contains no transformations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Evaluate the pipeline against an upstream identity.
    ///
    /// Expressions run in declared order. A `policy/v1` expression that
    /// returns `false` stops the pipeline with an `Ok` result carrying
    /// `authentication_allowed: false`; later expressions are not evaluated.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Timeout` when the shared wall-clock budget
    /// is exhausted (checked between expressions and inside a running
    /// expression), `TransformError::Runtime` for evaluation failures, and
    /// `TransformError::WrongResultType`/`EmptyUsername` when an expression
    /// produces an unusable value. Callers surface all of these to the
    /// client as an opaque `access_denied`.
    pub fn evaluate(
        &self,
        username: &str,
        groups: &[String],
    ) -> Result<TransformationResult, TransformError> {
        let deadline = Instant::now() + self.budget;
        let mut username = username.to_string();
        let mut groups = groups.to_vec();

        for transform in &self.transforms {
            if Instant::now() >= deadline {
                return Err(TransformError::Timeout {
                    budget: self.budget,
                });
            }

            let value = self.engine.evaluate(
                transform,
                &username,
                &groups,
                &self.constants.string_constants,
                &self.constants.string_list_constants,
                deadline,
                self.budget,
            )?;

            match transform.kind {
                TransformKind::Username => {
                    let new_username =
                        value
                            .into_string()
                            .map_err(|_| TransformError::WrongResultType {
                                expected: TransformKind::Username.expected_result_type(),
                            })?;
                    if new_username.is_empty() {
                        return Err(TransformError::EmptyUsername);
                    }
                    username = new_username;
                }
                TransformKind::Groups => {
                    let array =
                        value
                            .try_cast::<rhai::Array>()
                            .ok_or(TransformError::WrongResultType {
                                expected: TransformKind::Groups.expected_result_type(),
                            })?;
                    let mut new_groups = Vec::with_capacity(array.len());
                    for item in array {
                        let group =
                            item.into_string()
                                .map_err(|_| TransformError::WrongResultType {
                                    expected: TransformKind::Groups.expected_result_type(),
                                })?;
                        new_groups.push(group);
                    }
                    groups = new_groups;
                }
                TransformKind::Policy => {
                    let allowed = value.as_bool().map_err(|_| TransformError::WrongResultType {
                        expected: TransformKind::Policy.expected_result_type(),
                    })?;
                    if !allowed {
                        let message = transform
                            .policy_message
                            .clone()
                            .unwrap_or_else(|| DEFAULT_POLICY_REJECTED_MESSAGE.to_string());
                        return Ok(TransformationResult::rejected(message, username, groups));
                    }
                }
            }
        }

        Ok(TransformationResult::allowed(username, groups))
    }
}
