//! Sandboxed expression engine for identity transformations.
//!
//! # Design
//!
//! The Rhai engine is **created once** and shared by every pipeline compiled
//! against it. Expressions are compiled to an AST at reconcile time; only a
//! fresh evaluation scope is created per login, which is cheap.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ TransformEngine (created once at startup)    │
//! │   └── engine: rhai::Engine (sandbox limits)  │
//! └──────────────────────────────────────────────┘
//!               │
//!               ▼ evaluate(ast, username, groups, consts, deadline)
//! ┌──────────────────────────────────────────────┐
//! │ Per-login (lightweight):                     │
//! │   1. Arm the thread-local deadline           │
//! │   2. Push read-only variables into a Scope   │
//! │   3. Evaluate the AST with the scope         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Sandbox
//!
//! Expressions are operator-authored but still untrusted: the engine caps
//! operations, call depth, expression depth, and collection sizes, and the
//! `eval` symbol is disabled. On top of the operation cap, a progress hook
//! enforces the caller's wall-clock deadline from inside a running
//! expression. Evaluation is single-threaded per call, so the deadline is
//! carried in a thread-local armed by the evaluating thread.
//!
//! # Variables
//!
//! Every expression sees four read-only variables:
//!
//! - `username` - the upstream username (string)
//! - `groups` - the upstream group names (string list)
//! - `strConst` - declared string constants, by name
//! - `strListConst` - declared string-list constants, by name

use std::cell::Cell;
use std::time::Instant;

use rhai::{AST, Dynamic, Engine, EvalAltResult, Map, Scope};

use crate::error::TransformError;

thread_local! {
    /// Wall-clock deadline for the expression currently evaluating on this
    /// thread. Armed by [`TransformEngine::evaluate`], read by the engine's
    /// progress hook.
    static EVAL_DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// How often (in engine operations) the progress hook samples the clock.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Sentinel the progress hook returns to terminate an over-budget script.
const TERMINATED_DEADLINE: &str = "wall-clock deadline exceeded";

// =============================================================================
// Engine Configuration
// =============================================================================

/// Sandbox configuration for the transformation engine.
#[derive(Debug, Clone)]
pub struct TransformEngineConfig {
    /// Maximum number of engine operations per expression evaluation.
    pub max_operations: u64,

    /// Maximum function call nesting depth.
    pub max_call_levels: usize,

    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,

    /// Maximum string size (bytes) a script may build.
    pub max_string_size: usize,

    /// Maximum array size a script may build.
    pub max_array_size: usize,
}

impl Default for TransformEngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 500_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 1_000,
        }
    }
}

// =============================================================================
// Compiled Transform
// =============================================================================

/// The kind of an identity transformation expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// `username/v1`: evaluates to a string that replaces the username.
    Username,
    /// `groups/v1`: evaluates to a string list that replaces the groups.
    Groups,
    /// `policy/v1`: evaluates to a boolean; `false` rejects the login.
    Policy,
}

impl TransformKind {
    /// Parse an expression `type` declaration.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::UnsupportedExpressionType` for anything other
    /// than the three known kinds.
    pub fn parse(type_name: &str, index: usize) -> Result<Self, TransformError> {
        match type_name {
            "username/v1" => Ok(Self::Username),
            "groups/v1" => Ok(Self::Groups),
            "policy/v1" => Ok(Self::Policy),
            other => Err(TransformError::unsupported_expression_type(index, other)),
        }
    }

    /// The result type this kind requires, for error messages.
    #[must_use]
    pub fn expected_result_type(&self) -> &'static str {
        match self {
            Self::Username => "string",
            Self::Groups => "list of strings",
            Self::Policy => "boolean",
        }
    }
}

/// A single compiled transformation expression.
#[derive(Debug, Clone)]
pub struct CompiledTransform {
    /// The expression kind.
    pub kind: TransformKind,

    /// The compiled script.
    pub(crate) ast: AST,

    /// Rejection message for `policy/v1` expressions, when configured.
    pub(crate) policy_message: Option<String>,
}

// =============================================================================
// Transform Engine
// =============================================================================

/// Sandboxed engine shared by all compiled transformation pipelines.
pub struct TransformEngine {
    engine: Engine,
}

impl TransformEngine {
    /// Create a new engine with the given sandbox configuration.
    #[must_use]
    pub fn new(config: TransformEngineConfig) -> Self {
        let mut engine = Engine::new();

        engine.set_max_operations(config.max_operations);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
        engine.set_max_string_size(config.max_string_size);
        engine.set_max_array_size(config.max_array_size);
        engine.set_max_map_size(config.max_array_size);

        engine.disable_symbol("eval");

        // Terminate a running script once the evaluating call's wall-clock
        // deadline passes. The operation cap alone bounds compute but not
        // time spent in slow built-ins.
        engine.on_progress(|ops| {
            if ops % DEADLINE_CHECK_INTERVAL != 0 {
                return None;
            }
            let expired = EVAL_DEADLINE
                .with(|deadline| deadline.get().is_some_and(|d| Instant::now() >= d));
            expired.then(|| Dynamic::from(TERMINATED_DEADLINE.to_string()))
        });

        Self { engine }
    }

    /// Compile a single transformation expression.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Compile` when the expression does not parse,
    /// carrying the declared index so the reconciler can point at the right
    /// list entry in the FederationDomain status.
    pub fn compile(
        &self,
        kind: TransformKind,
        expression: &str,
        policy_message: Option<String>,
        index: usize,
    ) -> Result<CompiledTransform, TransformError> {
        let ast = self
            .engine
            .compile(expression)
            .map_err(|e| TransformError::compile(index, e.to_string()))?;

        Ok(CompiledTransform {
            kind,
            ast,
            policy_message,
        })
    }

    /// Evaluate one compiled expression against the given identity.
    ///
    /// The `deadline` applies to this single evaluation; the pipeline also
    /// checks it between expressions. Evaluation is single-threaded.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Timeout` when the deadline fires mid-script
    /// and `TransformError::Runtime` for any other engine failure. The error
    /// message contains engine diagnostics only, never user credentials.
    pub(crate) fn evaluate(
        &self,
        transform: &CompiledTransform,
        username: &str,
        groups: &[String],
        string_constants: &Map,
        string_list_constants: &Map,
        deadline: Instant,
        budget: std::time::Duration,
    ) -> Result<Dynamic, TransformError> {
        let mut scope = Scope::new();
        scope.push_constant("username", username.to_string());
        scope.push_constant(
            "groups",
            groups
                .iter()
                .map(|g| Dynamic::from(g.clone()))
                .collect::<rhai::Array>(),
        );
        scope.push_constant("strConst", string_constants.clone());
        scope.push_constant("strListConst", string_list_constants.clone());

        EVAL_DEADLINE.with(|cell| cell.set(Some(deadline)));
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &transform.ast);
        EVAL_DEADLINE.with(|cell| cell.set(None));

        result.map_err(|e| classify_eval_error(&e, budget))
    }
}

/// Map an engine evaluation error to the transform error taxonomy.
fn classify_eval_error(err: &EvalAltResult, budget: std::time::Duration) -> TransformError {
    match err {
        EvalAltResult::ErrorTerminated(..) => TransformError::Timeout { budget },
        other => TransformError::runtime(other.to_string()),
    }
}
