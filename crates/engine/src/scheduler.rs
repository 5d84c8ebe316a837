//! Readiness-driven workflow scheduler.
//!
//! `Scheduler` is the central orchestrator:
//! 1. Seeds a remaining-dependency counter per node from its in-degree.
//! 2. Dispatches every node whose counter is zero as its own tokio task.
//! 3. Stores each completed node's record in `SharedState` under its id.
//! 4. Decrements the counter of each dependent; zero means Ready.
//! 5. Applies the failure policy when a node fails.
//!
//! Fan-in nodes need no special casing: they become Ready when their
//! counter reaches zero, which happens only after every predecessor
//! completed.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use nodes::{RunContext, Snapshot, TaskRegistry};

use crate::error::{FailureCause, NodeFailure};
use crate::graph::WorkflowGraph;
use crate::state::SharedState;
use crate::WorkflowError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What happens to the rest of the run after a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip the failed node's descendants; independent branches finish.
    #[default]
    FailFast,
    /// Stop dispatching anything; every not-yet-started node is skipped.
    Abort,
}

/// Which signals a runner's snapshot contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the node's declared predecessors.
    #[default]
    Dependencies,
    /// Everything completed before the node became Ready.
    Completed,
}

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Maximum number of nodes running at once; `None` is unbounded.
    pub max_concurrency: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub visibility: Visibility,
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Lifecycle of one node within a run.
///
/// `started_seq`/`finished_seq` come from one counter shared by all nodes,
/// so they order events across branches independent of clock resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub status: NodeStatus,
    pub started_seq: Option<u64>,
    pub finished_seq: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    fn pending() -> Self {
        Self {
            status: NodeStatus::Pending,
            started_seq: None,
            finished_seq: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub nodes: BTreeMap<String, NodeRecord>,
}

impl RunReport {
    fn new(run_id: uuid::Uuid, graph: &WorkflowGraph) -> Self {
        Self {
            run_id,
            nodes: graph
                .all_nodes()
                .iter()
                .map(|id| (id.clone(), NodeRecord::pending()))
                .collect(),
        }
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.get(node_id).map(|r| r.status)
    }

    pub fn record(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    /// IDs of nodes in `status`, in key order.
    pub fn nodes_with(&self, status: NodeStatus) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// True when `first` finished before `second` started.
    pub fn finished_before_start(&self, first: &str, second: &str) -> bool {
        match (
            self.record(first).and_then(|r| r.finished_seq),
            self.record(second).and_then(|r| r.started_seq),
        ) {
            (Some(done), Some(start)) => done < start,
            _ => false,
        }
    }

    fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        if let Some(r) = self.nodes.get_mut(node_id) {
            r.status = status;
        }
    }

    fn start(&mut self, node_id: &str, seq: u64) {
        if let Some(r) = self.nodes.get_mut(node_id) {
            r.status = NodeStatus::Running;
            r.started_seq = Some(seq);
            r.started_at = Some(Utc::now());
        }
    }

    fn finish(&mut self, node_id: &str, seq: u64, status: NodeStatus) {
        if let Some(r) = self.nodes.get_mut(node_id) {
            r.status = status;
            r.finished_seq = Some(seq);
            r.finished_at = Some(Utc::now());
        }
    }

    /// Mark `node_id` skipped if it has not started; returns whether it was.
    fn skip(&mut self, node_id: &str) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(r) if matches!(r.status, NodeStatus::Pending | NodeStatus::Ready) => {
                r.status = NodeStatus::Skipped;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final shared state.
    pub snapshot: Snapshot,
    pub report: RunReport,
    /// Nodes nothing depends on.
    pub terminal_nodes: Vec<String>,
}

impl RunOutcome {
    /// The record of the single terminal node, if the graph has exactly one.
    pub fn terminal_result(&self) -> Option<(&str, &Value)> {
        match self.terminal_nodes.as_slice() {
            [id] => self.snapshot.get(id).map(|v| (id.as_str(), v)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

type Completion = (String, Result<(), FailureCause>);

/// Runs one workflow graph to completion.
///
/// Stateless between runs; construct one per process and call
/// [`Scheduler::run`] for each invocation.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute every node of `graph` and return the final state.
    ///
    /// # Errors
    /// - [`WorkflowError::MissingHandler`] before anything runs if a node
    ///   has no runner.
    /// - [`WorkflowError::Failed`] if any node failed; carries the report.
    #[instrument(
        name = "workflow_run",
        skip_all,
        fields(workflow = %graph.name(), run_id = %context.run_id)
    )]
    pub async fn run(
        &self,
        graph: Arc<WorkflowGraph>,
        context: RunContext,
        handlers: &TaskRegistry,
    ) -> Result<RunOutcome, WorkflowError> {
        if let Some(missing) = graph.all_nodes().iter().find(|id| !handlers.contains_key(*id)) {
            return Err(WorkflowError::MissingHandler(missing.clone()));
        }

        let state = Arc::new(SharedState::new(context));
        let mut report = RunReport::new(state.context().run_id, &graph);

        let mut remaining: HashMap<&str, usize> = graph
            .all_nodes()
            .iter()
            .map(|id| (id.as_str(), graph.in_degree(id)))
            .collect();

        // Each Ready node carries the snapshot taken when it became Ready.
        let mut ready: VecDeque<(String, Snapshot)> = VecDeque::new();
        for id in graph.entry_nodes() {
            report.set_status(id, NodeStatus::Ready);
            ready.push_back((id.to_owned(), Snapshot::default()));
        }

        info!(
            nodes = graph.len(),
            entry = ?ready.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            "workflow_started"
        );

        let limit = self.config.max_concurrency.unwrap_or(usize::MAX).max(1);
        let mut in_flight: JoinSet<Completion> = JoinSet::new();
        let mut failures: Vec<NodeFailure> = Vec::new();
        let mut halted = false;
        let mut seq: u64 = 0;

        loop {
            // ------------------------------------------------------------------
            // Dispatch as many Ready nodes as the limit allows.
            // ------------------------------------------------------------------
            while !halted && in_flight.len() < limit {
                let Some((node_id, snapshot)) = ready.pop_front() else {
                    break;
                };
                report.start(&node_id, seq);
                seq += 1;
                self.dispatch(&state, handlers, node_id, snapshot, &mut in_flight);
            }

            // ------------------------------------------------------------------
            // Wait for the next completion.
            // ------------------------------------------------------------------
            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (node_id, result) = joined.map_err(|e| WorkflowError::Join(e.to_string()))?;
            let finished = seq;
            seq += 1;

            match result {
                Ok(()) => {
                    report.finish(&node_id, finished, NodeStatus::Completed);
                    info!(node_id = %node_id, "node_completed");

                    for dependent in graph.dependents_of(&node_id) {
                        let Some(count) = remaining.get_mut(dependent.as_str()) else {
                            continue;
                        };
                        *count -= 1;
                        if *count == 0 && report.status(dependent) == Some(NodeStatus::Pending) {
                            report.set_status(dependent, NodeStatus::Ready);
                            let snapshot = self.visible_to(&graph, &state, &report, dependent);
                            ready.push_back((dependent.clone(), snapshot));
                        }
                    }
                }

                Err(cause) => {
                    report.finish(&node_id, finished, NodeStatus::Failed);
                    error!(node_id = %node_id, error = %cause, "node_failed");

                    let skipped: Vec<String> = match self.config.failure_policy {
                        FailurePolicy::FailFast => graph
                            .descendants_of(&node_id)
                            .into_iter()
                            .filter(|id| report.skip(id))
                            .map(str::to_owned)
                            .collect(),
                        FailurePolicy::Abort => {
                            halted = true;
                            graph
                                .all_nodes()
                                .iter()
                                .filter(|id| report.skip(id))
                                .cloned()
                                .collect()
                        }
                    };

                    if !skipped.is_empty() {
                        warn!(failed = %node_id, skipped = ?skipped, "node_skipped");
                        ready.retain(|(id, _)| !skipped.contains(id));
                    }

                    failures.push(NodeFailure { node_id, cause });
                }
            }
        }

        // Nodes whose predecessors were skipped never reach Ready.
        for id in graph.all_nodes() {
            report.skip(id);
        }

        if !failures.is_empty() {
            error!(failed = failures.len(), "workflow_failed");
            return Err(WorkflowError::Failed { failures, report });
        }

        info!("workflow_completed");

        Ok(RunOutcome {
            snapshot: state.read_all(),
            report,
            terminal_nodes: graph.terminal_nodes().into_iter().map(str::to_owned).collect(),
        })
    }

    /// Signals `node_id` may read, fixed at the moment it becomes Ready.
    ///
    /// Only nodes the scheduler has already recorded as Completed count; a
    /// record written by a task whose completion is still unprocessed is not
    /// visible.
    fn visible_to(
        &self,
        graph: &WorkflowGraph,
        state: &SharedState,
        report: &RunReport,
        node_id: &str,
    ) -> Snapshot {
        let all = state.read_all();
        match self.config.visibility {
            Visibility::Dependencies => {
                all.restricted_to(graph.predecessors_of(node_id).iter().map(String::as_str))
            }
            Visibility::Completed => all.restricted_to(report.nodes_with(NodeStatus::Completed)),
        }
    }

    /// Spawn one node. The runner executes in its own task so a panic is
    /// reported as that node's failure.
    fn dispatch(
        &self,
        state: &Arc<SharedState>,
        handlers: &TaskRegistry,
        node_id: String,
        snapshot: Snapshot,
        in_flight: &mut JoinSet<Completion>,
    ) {
        // Checked against the graph before the run starts.
        let Some(runner) = handlers.get(&node_id).cloned() else {
            return;
        };

        info!(node_id = %node_id, visible = ?snapshot.keys().collect::<Vec<_>>(), "node_started");

        let state = Arc::clone(state);
        let context = Arc::clone(state.context());
        let span = info_span!("task", node_id = %node_id);

        in_flight.spawn(async move {
            let execution = tokio::spawn(
                async move { runner.execute(&context, &snapshot).await }.instrument(span),
            );

            let result = match execution.await {
                Ok(Ok(record)) => state.write(&node_id, record).map_err(FailureCause::from),
                Ok(Err(e)) => Err(FailureCause::Task(e)),
                Err(join_err) => Err(FailureCause::Panicked(panic_message(join_err))),
            };

            (node_id, result)
        });
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
