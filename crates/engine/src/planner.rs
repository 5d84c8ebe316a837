//! One call from a trip to a go/no-go decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use nodes::sailing::{self, Decision, TideQuery, TripInput};
use nodes::{DataSource, NodeError, Oracle, RunContext, TaskRegistry};

use crate::graph::WorkflowGraph;
use crate::models::Workflow;
use crate::scheduler::{RunReport, Scheduler, SchedulerConfig};
use crate::{GraphError, WorkflowError};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("invalid trip input: {0}")]
    InvalidInput(String),

    /// The run finished but the decision record does not parse.
    #[error("decision record is unusable: {0}")]
    InvalidDecision(#[source] NodeError),
}

/// A completed plan: the decision plus every analyst signal behind it.
#[derive(Debug, Clone, Serialize)]
pub struct SailPlan {
    pub decision: Decision,
    /// Every signal except the decision itself, keyed by task id.
    pub signals: BTreeMap<String, Value>,
    #[serde(skip)]
    pub report: RunReport,
}

pub struct SailPlanner {
    graph: Arc<WorkflowGraph>,
    registry: TaskRegistry,
    scheduler: Scheduler,
}

impl SailPlanner {
    /// The built-in sailing workflow backed by the given collaborators.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        source: Arc<dyn DataSource>,
        config: SchedulerConfig,
    ) -> Result<Self, PlanError> {
        Self::with_registry(sailing::registry(oracle, source), config)
    }

    /// The built-in sailing workflow with caller-supplied runners.
    pub fn with_registry(registry: TaskRegistry, config: SchedulerConfig) -> Result<Self, PlanError> {
        let graph = WorkflowGraph::build(&Workflow::sailing())?;
        Ok(Self {
            graph: Arc::new(graph),
            registry,
            scheduler: Scheduler::new(config),
        })
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// # Errors
    /// [`PlanError::InvalidInput`] for an unparseable date, before any task
    /// runs.
    pub async fn plan(&self, trip: TripInput) -> Result<SailPlan, PlanError> {
        TideQuery::for_trip(&trip.start_date, None)
            .map_err(|e| PlanError::InvalidInput(e.to_string()))?;

        let input = serde_json::to_value(&trip).map_err(|e| PlanError::InvalidInput(e.to_string()))?;
        let context = RunContext::new(input);

        info!(location = %trip.location, date = %trip.start_date, "planning trip");

        let outcome = self
            .scheduler
            .run(Arc::clone(&self.graph), context, &self.registry)
            .await?;

        let decision: Decision = outcome
            .snapshot
            .signal(sailing::DECISION)
            .map_err(PlanError::InvalidDecision)?;

        let signals = outcome
            .snapshot
            .signals
            .into_iter()
            .filter(|(id, _)| id != sailing::DECISION)
            .collect();

        Ok(SailPlan {
            decision,
            signals,
            report: outcome.report,
        })
    }
}
