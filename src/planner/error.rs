//! Planner error types
//!
//! Planning errors are fatal for the current query: they are raised
//! immediately with the offending expression rendered into the message and
//! are never retried. A failed resolution discards the whole plan.

use thiserror::Error;

/// Planner error
#[derive(Error, Debug, Clone)]
pub enum PlannerError {
    /// Semantic analysis failure: unbindable or ambiguous column,
    /// non-grouped column in an aggregate output, subquery arity mismatch
    #[error("semantic analysis: {0}")]
    SemanticAnalyze(String),

    /// Planner inconsistency: an expression cannot be placed on either side
    /// of a join. Indicates a binder/planner bug, not a user error.
    #[error("invalid program: {0}")]
    InvalidProgram(String),

    /// A logical node or strategy has no physical mapping configured
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Execution-time semantic failure surfaced through the executor boundary
    #[error("semantic execution: {0}")]
    SemanticExecution(String),
}

impl From<crate::executor::ExecutorError> for PlannerError {
    fn from(err: crate::executor::ExecutorError) -> Self {
        PlannerError::SemanticExecution(err.to_string())
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
