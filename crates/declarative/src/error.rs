//! Error types for plan rendering, resolution and execution.
//!
//! Errors are categorized the same way they are handled: format and graph
//! errors abort before any phase runs, parse errors abort the phase
//! configuration they belong to. A failed phase is never an error; it is an
//! [`ExecutionResult`](crate::types::ExecutionResult) with `success == false`.

use thiserror::Error;

/// Categories of plan errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unrecognized manifest shape or missing plan document
    Format,
    /// Circular dependency or unknown phase reference
    Graph,
    /// Malformed timeout or retry configuration
    Parse,
    /// Engine invariant violated
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Format => "Invalid manifest format",
            Self::Graph => "Invalid phase dependency graph",
            Self::Parse => "Invalid phase configuration",
            Self::Internal => "Internal engine error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Format => {
                "Provide a `phases` list, a `plan` mapping, or a document list with one `plan` entry"
            }
            Self::Graph => "Check the `waitFor.dependsOn` entries of the named phase",
            Self::Parse => "Timeouts look like `300ms`, `5s`, `2m`, `1h`; maxAttempts is a positive integer",
            Self::Internal => "Please report this as a bug",
        }
    }
}

/// Errors that can occur while rendering, resolving or executing a plan.
#[derive(Debug, Error)]
pub enum Error {
    /// Manifest is not one of the accepted shapes
    #[error("unrecognized manifest format: {0}")]
    Format(String),

    /// Document list without exactly one `plan` document
    #[error("expected exactly one plan document in manifest list, found {found}")]
    MissingPlan {
        /// Number of plan documents found
        found: usize,
    },

    /// Two phases share an id
    #[error("duplicate phase id: {phase}")]
    DuplicatePhase { phase: String },

    /// Resource document carries neither `id` nor `name`
    #[error("resource has no id or name: {0}")]
    MissingResourceId(String),

    /// Dependency cycle (including a phase depending on itself)
    #[error("circular dependency detected involving phase: {phase}")]
    CircularDependency { phase: String },

    /// Dependency or target names a phase that does not exist
    #[error("unknown phase referenced: {phase}")]
    UnknownPhase { phase: String },

    /// Timeout does not match `<integer>[ms|s|m|h]`
    #[error("invalid timeout format: {value:?}")]
    InvalidTimeout { value: String },

    /// Retry count is not a positive integer
    #[error("invalid retry count for phase {phase}: {value}")]
    InvalidRetry { phase: String, value: String },

    /// Phase configuration could not be decoded
    #[error("invalid configuration for phase {phase}: {source}")]
    InvalidPhase {
        phase: String,
        #[source]
        source: serde_json::Error,
    },

    /// Executor attempted a transition its table does not allow
    #[error("invalid phase state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Worker pool could not be created
    #[error("failed to create phase worker pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Format(_)
            | Error::MissingPlan { .. }
            | Error::DuplicatePhase { .. }
            | Error::MissingResourceId(_) => ErrorCategory::Format,
            Error::CircularDependency { .. } | Error::UnknownPhase { .. } => ErrorCategory::Graph,
            Error::InvalidTimeout { .. } | Error::InvalidRetry { .. } | Error::InvalidPhase { .. } => {
                ErrorCategory::Parse
            }
            Error::InvalidTransition { .. } | Error::ThreadPool(_) => ErrorCategory::Internal,
        }
    }
}

/// Result type for plan operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_errors_name_the_phase() {
        let err = Error::CircularDependency {
            phase: "setup".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Graph);
        assert!(err.to_string().contains("setup"));

        let err = Error::UnknownPhase {
            phase: "ghost".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Graph);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::MissingPlan { found: 0 }.category(),
            ErrorCategory::Format
        );
        assert_eq!(
            Error::InvalidTimeout {
                value: "5x".to_string()
            }
            .category(),
            ErrorCategory::Parse
        );
    }
}
