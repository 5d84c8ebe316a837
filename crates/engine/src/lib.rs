//! `engine` crate — workflow definitions, graph validation, the shared state
//! store and the scheduler that runs it all.

pub mod models;
pub mod error;
pub mod graph;
pub mod state;
pub mod scheduler;
pub mod planner;

pub use models::{Edge, NodeDefinition, Workflow};
pub use error::{FailureCause, GraphError, NodeFailure, StateError, WorkflowError};
pub use graph::WorkflowGraph;
pub use state::SharedState;
pub use scheduler::{
    FailurePolicy, NodeRecord, NodeStatus, RunOutcome, RunReport, Scheduler, SchedulerConfig,
    Visibility,
};
pub use planner::{PlanError, SailPlan, SailPlanner};

#[cfg(test)]
mod scheduler_tests;
