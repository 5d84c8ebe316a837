//! Test doubles for `TaskRunner`, `Oracle` and `DataSource`.
//!
//! Useful in unit and integration tests where a real runner or collaborator
//! is either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::oracle::{Oracle, OracleError, OracleRequest};
use crate::source::{DataSource, DataSourceError, SourceQuery, SourceResponse};
use crate::traits::{RunContext, Snapshot};
use crate::{NodeError, TaskRunner};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with the given error.
    Fail(NodeError),
    /// Panic inside `execute`.
    Panic(String),
}

/// A mock runner that records every snapshot it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Simulated latency before the behaviour is applied.
    pub delay: Option<Duration>,
    /// All snapshots seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Snapshot>>>,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(NodeError::Fatal(msg.into())))
    }

    /// Create a mock that fails with a specific error.
    pub fn failing_with(name: impl Into<String>, err: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(err))
    }

    /// Create a mock that panics when executed.
    pub fn panicking(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Panic(msg.into()))
    }

    /// Sleep for `delay` before producing the result.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot passed to the most recent call.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TaskRunner for MockNode {
    async fn execute(&self, _ctx: &RunContext, snapshot: &Snapshot) -> Result<Value, NodeError> {
        self.calls.lock().unwrap().push(snapshot.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                // Merge the node's name into its output so tests can trace
                // which runner produced a record.
                let mut out = json!({ "node": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(out)
            }
            MockBehaviour::Fail(err) => Err(err.clone()),
            MockBehaviour::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// An `Oracle` that answers from a table keyed by schema name.
#[derive(Default)]
pub struct StubOracle {
    responses: HashMap<String, Result<String, OracleError>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `schema` with `value` serialised as JSON.
    pub fn respond(self, schema: &str, value: Value) -> Self {
        self.respond_raw(schema, value.to_string())
    }

    /// Answer requests for `schema` with arbitrary text.
    pub fn respond_raw(mut self, schema: &str, text: impl Into<String>) -> Self {
        self.responses.insert(schema.to_owned(), Ok(text.into()));
        self
    }

    /// Fail requests for `schema`.
    pub fn fail(mut self, schema: &str, err: OracleError) -> Self {
        self.responses.insert(schema.to_owned(), Err(err));
        self
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests received for one schema.
    pub fn requests_for(&self, schema: &str) -> Vec<OracleRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.schema == schema)
            .collect()
    }
}

#[async_trait]
impl Oracle for StubOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests.lock().unwrap().push(request.clone());

        self.responses
            .get(&request.schema)
            .cloned()
            .unwrap_or_else(|| {
                Err(OracleError::Unreachable(format!(
                    "no stub response for schema '{}'",
                    request.schema
                )))
            })
    }
}

/// A `DataSource` that answers per station id.
///
/// Stations without a configured answer return 404 with a null payload.
#[derive(Default)]
pub struct StubSource {
    responses: HashMap<String, Result<SourceResponse, DataSourceError>>,
    queries: Mutex<Vec<SourceQuery>>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, station: &str, status: u16, payload: Value) -> Self {
        self.responses
            .insert(station.to_owned(), Ok(SourceResponse { status, payload }));
        self
    }

    pub fn fail(mut self, station: &str, msg: &str) -> Self {
        self.responses
            .insert(station.to_owned(), Err(DataSourceError(msg.to_owned())));
        self
    }

    pub fn queries(&self) -> Vec<SourceQuery> {
        self.queries.lock().unwrap().clone()
    }

    /// Station ids of every query received, in call order.
    pub fn attempted_stations(&self) -> Vec<String> {
        self.queries()
            .iter()
            .filter_map(|q| q.get("station").map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl DataSource for StubSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<SourceResponse, DataSourceError> {
        self.queries.lock().unwrap().push(query.clone());

        let station = query.get("station").unwrap_or_default();
        self.responses.get(station).cloned().unwrap_or(Ok(SourceResponse {
            status: 404,
            payload: Value::Null,
        }))
    }
}
