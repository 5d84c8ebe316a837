//! Engine-level error types.

use nodes::NodeError;
use thiserror::Error;

use crate::scheduler::RunReport;

// ------ Build-time errors ------

/// The workflow definition cannot be turned into a `WorkflowGraph`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The workflow declares no nodes.
    #[error("workflow has no nodes")]
    Empty,

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort could not consume every node.
    #[error("workflow graph contains a cycle through '{node_id}'")]
    Cycle { node_id: String },
}

// ------ Shared state errors ------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A second write to an existing signal key.
    #[error("signal '{0}' has already been written")]
    DuplicateKey(String),
}

// ------ Run-time errors ------

/// Why one node ended in `Failed`.
#[derive(Debug, Error, Clone)]
pub enum FailureCause {
    #[error(transparent)]
    Task(#[from] NodeError),

    #[error(transparent)]
    State(#[from] StateError),

    /// The runner panicked; the panic payload is kept as text.
    #[error("task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct NodeFailure {
    pub node_id: String,
    pub cause: FailureCause,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}': {}", self.node_id, self.cause)
    }
}

/// Errors surfaced to the caller of `Scheduler::run`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow: {0}")]
    Graph(#[from] GraphError),

    /// A node has no registered runner; nothing was executed.
    #[error("no runner registered for node '{0}'")]
    MissingHandler(String),

    /// One or more nodes failed. The report holds every node's final state.
    #[error("workflow failed at {}", describe(.failures))]
    Failed {
        failures: Vec<NodeFailure>,
        report: RunReport,
    },

    /// The coordinator lost track of a task.
    #[error("task join error: {0}")]
    Join(String),
}

fn describe(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkflowError {
    /// IDs of the nodes that failed, in failure order.
    pub fn failed_nodes(&self) -> Vec<&str> {
        match self {
            WorkflowError::Failed { failures, .. } => {
                failures.iter().map(|f| f.node_id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            WorkflowError::Failed { report, .. } => Some(report),
            _ => None,
        }
    }
}
