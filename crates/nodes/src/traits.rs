//! The `TaskRunner` trait — the contract every workflow task must fulfil.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeError;

/// Immutable run-scoped input shared by every task of one run.
///
/// Defined here (in the nodes crate) so both the engine and individual task
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// ID of the current run.
    pub run_id: uuid::Uuid,
    /// Input supplied by the caller before scheduling began.
    pub input: Value,
}

impl RunContext {
    pub fn new(input: Value) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            input,
        }
    }

    /// Deserialize the run input into a task-specific shape.
    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        serde_json::from_value(self.input.clone()).map_err(|e| NodeError::InvalidInput(e.to_string()))
    }
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub task_id: String,
    pub record: Value,
    pub recorded_at: DateTime<Utc>,
}

/// A consistent, owned view of the shared state at one point in time.
///
/// Runners only ever see snapshots; they never hold another task's record
/// mutably.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub signals: BTreeMap<String, Value>,
    pub log: Vec<LogEntry>,
}

impl Snapshot {
    /// Raw record written by `task_id`, if visible.
    pub fn get(&self, task_id: &str) -> Option<&Value> {
        self.signals.get(task_id)
    }

    /// Typed record written by `task_id`.
    pub fn signal<T: DeserializeOwned>(&self, task_id: &str) -> Result<T, NodeError> {
        let raw = self
            .get(task_id)
            .ok_or_else(|| NodeError::MissingSignal(task_id.to_owned()))?;

        serde_json::from_value(raw.clone()).map_err(|e| NodeError::InvalidSignal {
            task_id: task_id.to_owned(),
            message: e.to_string(),
        })
    }

    /// Ids of every visible signal, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Narrow the view to the given task ids, keeping log order.
    pub fn restricted_to<'a, I>(&self, task_ids: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: Vec<&str> = task_ids.into_iter().collect();

        Snapshot {
            signals: self
                .signals
                .iter()
                .filter(|(id, _)| wanted.contains(&id.as_str()))
                .map(|(id, v)| (id.clone(), v.clone()))
                .collect(),
            log: self
                .log
                .iter()
                .filter(|e| wanted.contains(&e.task_id.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// The core task trait.
///
/// A runner turns the run context plus the outputs of its upstream tasks
/// into its own output record. It never writes shared state itself; the
/// scheduler stores the returned record under the runner's node id.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn execute(&self, ctx: &RunContext, snapshot: &Snapshot) -> Result<Value, NodeError>;
}

/// Maps node ids to their runner implementations.
pub type TaskRegistry = HashMap<String, Arc<dyn TaskRunner>>;
