//! # selkie-transform
//!
//! Identity transformation pipeline for the Selkie supervisor.
//!
//! A federation domain may declare an ordered list of transformation
//! expressions per upstream identity provider. After a user authenticates
//! against the upstream provider, the pipeline rewrites the resulting
//! `(username, groups)` identity or rejects the authentication outright:
//!
//! - `username/v1` expressions evaluate to a string that replaces the
//!   username,
//! - `groups/v1` expressions evaluate to a string list that replaces the
//!   group memberships,
//! - `policy/v1` expressions evaluate to a boolean; `false` rejects the
//!   authentication and stops the pipeline.
//!
//! Expressions are authored by cluster operators and are untrusted input,
//! so they run inside a sandboxed [Rhai](https://rhai.rs) engine with hard
//! resource limits and a wall-clock budget shared across the whole
//! pipeline evaluation.
//!
//! ## Modules
//!
//! - [`engine`] - Sandboxed expression engine (compile + evaluate)
//! - [`pipeline`] - Ordered pipeline of compiled transformations
//! - [`error`] - Transformation error types

pub mod engine;
pub mod error;
pub mod pipeline;

pub use engine::{CompiledTransform, TransformEngine, TransformEngineConfig, TransformKind};
pub use error::TransformError;
pub use pipeline::{
    DEFAULT_EVALUATION_BUDGET, DEFAULT_POLICY_REJECTED_MESSAGE, TransformationConstants,
    TransformationPipeline, TransformationResult,
};

/// Type alias for transformation results.
pub type TransformResult<T> = Result<T, TransformError>;
