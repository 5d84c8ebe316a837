//! Task-level error types.

use thiserror::Error;

use crate::oracle::OracleError;
use crate::resolver::ExhaustedError;

/// Errors returned by a runner's `execute` method.
///
/// Every variant is a task failure; the scheduler applies its failure
/// policy without inspecting the cause.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The Oracle produced no usable structured output.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Every ranked data-source candidate failed.
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    /// An upstream signal this task depends on is not in its snapshot.
    #[error("upstream signal '{0}' is missing")]
    MissingSignal(String),

    /// An upstream signal is present but does not have the expected shape.
    #[error("upstream signal '{task_id}' is invalid: {message}")]
    InvalidSignal { task_id: String, message: String },

    /// The run context could not be interpreted by this task.
    #[error("invalid run input: {0}")]
    InvalidInput(String),

    /// Permanent failure with no more specific cause.
    #[error("fatal node error: {0}")]
    Fatal(String),
}
