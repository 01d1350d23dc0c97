//! Identity transformation error types.

use std::time::Duration;

/// Errors that can occur while compiling or evaluating identity
/// transformation expressions.
///
/// Compile errors are configuration errors: they are reported on the
/// FederationDomain status at reconcile time and keep the domain from being
/// loaded. Evaluation errors happen at login time and are surfaced to the
/// client as an opaque `access_denied`; the expression text is never part
/// of a user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// An expression failed to compile.
    #[error("expression at index {index} failed to compile: {message}")]
    Compile {
        /// Position of the expression in the declared list.
        index: usize,
        /// Parser error description.
        message: String,
    },

    /// The expression `type` is not one of the supported kinds.
    #[error("expression at index {index} has unsupported type {type_name:?}")]
    UnsupportedExpressionType {
        /// Position of the expression in the declared list.
        index: usize,
        /// The unrecognized type string.
        type_name: String,
    },

    /// An expression failed at evaluation time.
    #[error("expression evaluation failed: {message}")]
    Runtime {
        /// Engine error description.
        message: String,
    },

    /// The pipeline exceeded its wall-clock budget.
    #[error("identity transformation took longer than the allowed {budget:?}")]
    Timeout {
        /// The configured budget that was exceeded.
        budget: Duration,
    },

    /// An expression evaluated to a value of the wrong type.
    #[error("expression returned the wrong type: expected {expected}")]
    WrongResultType {
        /// The type the expression kind requires.
        expected: &'static str,
    },

    /// A `username/v1` expression produced an empty username.
    #[error("transformed username cannot be empty")]
    EmptyUsername,
}

impl TransformError {
    /// Create a new `Compile` error.
    #[must_use]
    pub fn compile(index: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            index,
            message: message.into(),
        }
    }

    /// Create a new `UnsupportedExpressionType` error.
    #[must_use]
    pub fn unsupported_expression_type(index: usize, type_name: impl Into<String>) -> Self {
        Self::UnsupportedExpressionType {
            index,
            type_name: type_name.into(),
        }
    }

    /// Create a new `Runtime` error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a configuration-time error (bad expression
    /// declaration) as opposed to a login-time evaluation failure.
    #[must_use]
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::Compile { .. } | Self::UnsupportedExpressionType { .. }
        )
    }

    /// Returns `true` if the pipeline ran out of wall-clock budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransformError::compile(2, "unexpected token");
        assert_eq!(
            err.to_string(),
            "expression at index 2 failed to compile: unexpected token"
        );

        let err = TransformError::unsupported_expression_type(0, "policy/v2");
        assert_eq!(
            err.to_string(),
            "expression at index 0 has unsupported type \"policy/v2\""
        );

        let err = TransformError::Timeout {
            budget: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(TransformError::compile(0, "x").is_compile_error());
        assert!(TransformError::unsupported_expression_type(0, "x").is_compile_error());
        assert!(!TransformError::runtime("x").is_compile_error());

        assert!(
            TransformError::Timeout {
                budget: Duration::from_secs(1)
            }
            .is_timeout()
        );
        assert!(!TransformError::runtime("x").is_timeout());
    }
}
