//! Scheduler tests.
//!
//! Everything runs in-process: runners are `MockNode`s or the real sailing
//! tasks backed by `StubOracle` / `StubSource`, so no network is touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use nodes::mock::{MockNode, StubOracle, StubSource};
use nodes::sailing::{self, Action, TripInput};
use nodes::{NodeError, RunContext, Snapshot, TaskRegistry, TaskRunner};

use crate::{
    FailureCause, FailurePolicy, GraphError, NodeStatus, SailPlanner, Scheduler, SchedulerConfig,
    Visibility, Workflow, WorkflowError, WorkflowGraph,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn graph(workflow: &Workflow) -> Arc<WorkflowGraph> {
    Arc::new(WorkflowGraph::build(workflow).expect("valid workflow"))
}

fn sailing_graph() -> Arc<WorkflowGraph> {
    graph(&Workflow::sailing())
}

fn trip_ctx() -> RunContext {
    RunContext::new(json!(TripInput::new(
        "Port Orchard Marina, Port Orchard, Washington",
        "03/16/2025"
    )))
}

/// One `MockNode` per id, each returning `{"node": id}`.
fn mocks(ids: &[&str]) -> HashMap<String, Arc<MockNode>> {
    ids.iter()
        .map(|id| (id.to_string(), Arc::new(MockNode::returning(*id, json!({})))))
        .collect()
}

fn registry(mocks: &HashMap<String, Arc<MockNode>>) -> TaskRegistry {
    mocks
        .iter()
        .map(|(id, node)| (id.clone(), Arc::clone(node) as Arc<dyn TaskRunner>))
        .collect()
}

/// Tracks how many instances run at the same time.
struct Gauge {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskRunner for Gauge {
    async fn execute(&self, _ctx: &RunContext, _snapshot: &Snapshot) -> Result<Value, NodeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

/// Delegates to another runner and keeps the snapshot it was given.
struct Spy {
    inner: Arc<dyn TaskRunner>,
    seen: Mutex<Option<Snapshot>>,
}

#[async_trait]
impl TaskRunner for Spy {
    async fn execute(&self, ctx: &RunContext, snapshot: &Snapshot) -> Result<Value, NodeError> {
        *self.seen.lock().unwrap() = Some(snapshot.clone());
        self.inner.execute(ctx, snapshot).await
    }
}

fn sailing_oracle(action: &str) -> StubOracle {
    StubOracle::new()
        .respond(
            "wind",
            json!({
                "wind_strength": "8 to 12 knots, gusts 18",
                "wind_direction": "SW",
                "confidence": 78,
                "reasoning": "post-frontal southwesterly",
            }),
        )
        .respond(
            "weather",
            json!({
                "temperature": "45 to 55",
                "rain_forecast": "light showers",
                "confidence": 70,
                "reasoning": "showers clearing by noon",
            }),
        )
        .respond(
            "stations",
            json!({
                "station_ids": ["S1", "S2", "S3"],
                "station_names": ["Bremerton", "Seattle", "Tacoma"],
                "station_distances": [2.0, 14.5, 22.0],
            }),
        )
        .respond(
            "current",
            json!({
                "current_speed": "0.3 to 1.0 knots",
                "current_direction": "ebb to the north",
                "confidence": 65,
                "reasoning": "moderate ebb late morning",
            }),
        )
        .respond(
            "decision",
            json!({
                "action": action,
                "confidence": 82,
                "reasoning": "wind well under 25 knots and current is manageable",
            }),
        )
}

fn sailing_source() -> StubSource {
    StubSource::new()
        .respond("S1", 404, Value::Null)
        .fail("S2", "connection reset")
        .respond(
            "S3",
            200,
            json!({ "predictions": [{ "t": "2025-03-16 06:12", "v": "3.104" }] }),
        )
}

// ---------------------------------------------------------------------------
// Termination and exactly-once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_node_runs_exactly_once_and_completes() {
    let wf = Workflow::from_dependencies(
        "diamond-fan",
        [
            ("root", vec![]),
            ("left", vec!["root"]),
            ("right", vec!["root"]),
            ("join", vec!["left", "right"]),
            ("f1", vec!["join"]),
            ("f2", vec!["join"]),
            ("f3", vec!["join"]),
            ("tail", vec!["f1", "f2", "f3"]),
        ],
    );
    let ids: Vec<&str> = wf.nodes.iter().map(|n| n.id.as_str()).collect();
    let mocks = mocks(&ids);

    let outcome = Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .expect("run succeeds");

    for id in &ids {
        assert_eq!(mocks[*id].call_count(), 1, "{id} ran more than once");
        assert_eq!(outcome.report.status(id), Some(NodeStatus::Completed));
    }
    assert_eq!(outcome.snapshot.len(), ids.len());
    assert_eq!(outcome.snapshot.log.len(), ids.len());
    assert_eq!(outcome.terminal_nodes, vec!["tail".to_string()]);
    assert_eq!(outcome.terminal_result().unwrap().1["node"], "tail");
}

#[tokio::test]
async fn join_node_waits_for_every_predecessor() {
    let wf = Workflow::from_dependencies(
        "fan-in",
        [("a", vec![]), ("b", vec![]), ("c", vec!["a", "b"])],
    );
    let mocks = mocks(&["a", "b", "c"]);

    let outcome = Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .unwrap();

    let seen = mocks["c"].last_snapshot().unwrap();
    assert_eq!(seen.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert!(outcome.report.finished_before_start("a", "c"));
    assert!(outcome.report.finished_before_start("b", "c"));
}

#[tokio::test(start_paused = true)]
async fn delaying_wind_delays_decision() {
    let mut mocks = mocks(&sailing::NODES);
    mocks.insert(
        sailing::WIND.into(),
        Arc::new(MockNode::returning("wind", json!({})).delayed(Duration::from_secs(5))),
    );

    let outcome = Scheduler::default()
        .run(sailing_graph(), trip_ctx(), &registry(&mocks))
        .await
        .unwrap();

    let report = &outcome.report;
    for dep in [sailing::WEATHER, sailing::CURRENT] {
        let dep_done = report.record(dep).unwrap().finished_seq;
        let wind_done = report.record(sailing::WIND).unwrap().finished_seq;
        assert!(dep_done < wind_done, "{dep} should finish before the delayed wind task");
    }
    assert!(report.finished_before_start(sailing::WIND, sailing::DECISION));
    assert_eq!(mocks[sailing::DECISION].call_count(), 1);
}

// ---------------------------------------------------------------------------
// Failure policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_weather_skips_decision_but_independent_branches_finish() {
    let mut mocks = mocks(&sailing::NODES);
    mocks.insert(
        sailing::WEATHER.into(),
        Arc::new(MockNode::failing("weather", "forecast service down")),
    );

    let err = Scheduler::default()
        .run(sailing_graph(), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    assert_eq!(err.failed_nodes(), vec!["weather"]);
    assert!(err.to_string().contains("weather"));

    let report = err.report().unwrap();
    assert_eq!(report.status("weather"), Some(NodeStatus::Failed));
    assert_eq!(report.status("decision"), Some(NodeStatus::Skipped));
    assert_eq!(report.status("wind"), Some(NodeStatus::Completed));
    assert_eq!(report.status("station_lookup"), Some(NodeStatus::Completed));
    assert_eq!(report.status("current"), Some(NodeStatus::Completed));
    assert_eq!(mocks["decision"].call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn abort_policy_stops_dispatching_new_work() {
    let wf = Workflow::from_dependencies(
        "abort",
        [("slow", vec![]), ("boom", vec![]), ("after_slow", vec!["slow"])],
    );
    let mut mocks = mocks(&["slow", "after_slow"]);
    mocks.insert(
        "slow".into(),
        Arc::new(MockNode::returning("slow", json!({})).delayed(Duration::from_secs(1))),
    );
    mocks.insert("boom".into(), Arc::new(MockNode::failing("boom", "bad input")));

    let scheduler = Scheduler::new(SchedulerConfig {
        failure_policy: FailurePolicy::Abort,
        ..Default::default()
    });
    let err = scheduler
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.status("boom"), Some(NodeStatus::Failed));
    // Already running when the failure arrived, so it is allowed to finish.
    assert_eq!(report.status("slow"), Some(NodeStatus::Completed));
    assert_eq!(report.status("after_slow"), Some(NodeStatus::Skipped));
    assert_eq!(mocks["after_slow"].call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_keeps_unrelated_descendants_running() {
    let wf = Workflow::from_dependencies(
        "fail-fast",
        [("slow", vec![]), ("boom", vec![]), ("after_slow", vec!["slow"])],
    );
    let mut mocks = mocks(&["slow", "after_slow"]);
    mocks.insert(
        "slow".into(),
        Arc::new(MockNode::returning("slow", json!({})).delayed(Duration::from_secs(1))),
    );
    mocks.insert("boom".into(), Arc::new(MockNode::failing("boom", "bad input")));

    let err = Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.status("after_slow"), Some(NodeStatus::Completed));
    assert_eq!(report.nodes_with(NodeStatus::Failed), vec!["boom"]);
}

#[tokio::test]
async fn panicking_runner_fails_only_its_node() {
    let wf = Workflow::from_dependencies("panic", [("ok", vec![]), ("bad", vec![])]);
    let mut mocks = mocks(&["ok"]);
    mocks.insert("bad".into(), Arc::new(MockNode::panicking("bad", "kaboom")));

    let err = Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    let WorkflowError::Failed { failures, report } = err else {
        panic!("expected a failed run");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0].cause, FailureCause::Panicked(msg) if msg.contains("kaboom")));
    assert_eq!(report.status("ok"), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn task_error_is_carried_in_the_failure() {
    let wf = Workflow::from_dependencies("missing", [("decision", vec![])]);
    let mut mocks = HashMap::new();
    mocks.insert(
        "decision".to_string(),
        Arc::new(MockNode::failing_with(
            "decision",
            NodeError::MissingSignal("wind".into()),
        )),
    );

    let err = Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    let WorkflowError::Failed { failures, .. } = err else {
        panic!("expected a failed run");
    };
    assert!(matches!(
        &failures[0].cause,
        FailureCause::Task(NodeError::MissingSignal(id)) if id == "wind"
    ));
}

// ---------------------------------------------------------------------------
// Validation before execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_handler_is_rejected_before_anything_runs() {
    let mut mocks = mocks(&sailing::NODES);
    mocks.remove(sailing::CURRENT);

    let err = Scheduler::default()
        .run(sailing_graph(), trip_ctx(), &registry(&mocks))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::MissingHandler(ref id) if id == "current"));
    assert!(mocks.values().all(|m| m.call_count() == 0));
}

#[test]
fn two_node_cycle_is_rejected_at_build() {
    let wf = Workflow::from_dependencies("loop", [("a", vec!["b"]), ("b", vec!["a"])]);
    assert!(matches!(
        WorkflowGraph::build(&wf),
        Err(GraphError::Cycle { .. })
    ));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn max_concurrency_bounds_running_nodes() {
    let ids = ["a", "b", "c", "d", "e"];
    let wf = Workflow::from_pairs("wide", &ids, &[]);

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry: TaskRegistry = ids
        .iter()
        .map(|id| {
            let gauge = Gauge {
                active: Arc::clone(&active),
                peak: Arc::clone(&peak),
            };
            (id.to_string(), Arc::new(gauge) as Arc<dyn TaskRunner>)
        })
        .collect();

    let scheduler = Scheduler::new(SchedulerConfig {
        max_concurrency: Some(2),
        ..Default::default()
    });
    let outcome = scheduler.run(graph(&wf), trip_ctx(), &registry).await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.report.nodes_with(NodeStatus::Completed).len(), ids.len());
}

#[tokio::test]
async fn snapshot_visibility_follows_config() {
    let wf = Workflow::from_dependencies(
        "chain",
        [("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])],
    );

    let mocks_default = mocks(&["a", "b", "c"]);
    Scheduler::default()
        .run(graph(&wf), trip_ctx(), &registry(&mocks_default))
        .await
        .unwrap();
    let seen = mocks_default["c"].last_snapshot().unwrap();
    assert_eq!(seen.keys().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(seen.log.len(), 1);

    let mocks_all = mocks(&["a", "b", "c"]);
    Scheduler::new(SchedulerConfig {
        visibility: Visibility::Completed,
        ..Default::default()
    })
    .run(graph(&wf), trip_ctx(), &registry(&mocks_all))
    .await
    .unwrap();
    let seen = mocks_all["c"].last_snapshot().unwrap();
    assert_eq!(seen.keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn completed_visibility_is_fixed_when_the_node_becomes_ready() {
    // a and b are entries; c waits on a. With one slot, c becomes Ready when a
    // finishes but is dispatched only after b has run.
    let wf = Workflow::from_dependencies(
        "queued",
        [("a", vec![]), ("b", vec![]), ("c", vec!["a"])],
    );
    let mocks = mocks(&["a", "b", "c"]);

    let outcome = Scheduler::new(SchedulerConfig {
        max_concurrency: Some(1),
        visibility: Visibility::Completed,
        ..Default::default()
    })
    .run(graph(&wf), trip_ctx(), &registry(&mocks))
    .await
    .unwrap();

    assert!(outcome.report.finished_before_start("b", "c"));
    let seen = mocks["c"].last_snapshot().unwrap();
    assert_eq!(seen.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(seen.log.len(), 1);
}

#[tokio::test]
async fn fail_fast_with_one_slot_still_runs_queued_independent_nodes() {
    let wf = Workflow::from_pairs("queued-fail-fast", &["boom", "x", "y"], &[]);
    let mut mocks = mocks(&["x", "y"]);
    mocks.insert("boom".into(), Arc::new(MockNode::failing("boom", "bad input")));

    let err = Scheduler::new(SchedulerConfig {
        max_concurrency: Some(1),
        ..Default::default()
    })
    .run(graph(&wf), trip_ctx(), &registry(&mocks))
    .await
    .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.status("boom"), Some(NodeStatus::Failed));
    assert_eq!(report.nodes_with(NodeStatus::Completed), vec!["x", "y"]);
    assert!(report.finished_before_start("boom", "x"));
    assert_eq!(mocks["y"].call_count(), 1);
}

#[tokio::test]
async fn abort_with_one_slot_skips_queued_ready_nodes() {
    let wf = Workflow::from_pairs("queued-abort", &["boom", "x", "y"], &[]);
    let mut mocks = mocks(&["x", "y"]);
    mocks.insert("boom".into(), Arc::new(MockNode::failing("boom", "bad input")));

    let err = Scheduler::new(SchedulerConfig {
        max_concurrency: Some(1),
        failure_policy: FailurePolicy::Abort,
        ..Default::default()
    })
    .run(graph(&wf), trip_ctx(), &registry(&mocks))
    .await
    .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.status("boom"), Some(NodeStatus::Failed));
    assert_eq!(report.nodes_with(NodeStatus::Skipped), vec!["x", "y"]);
    assert_eq!(mocks["x"].call_count(), 0);
    assert_eq!(mocks["y"].call_count(), 0);
}

// ---------------------------------------------------------------------------
// End to end with the sailing tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sailing_run_feeds_decision_exactly_its_three_signals() {
    let oracle = Arc::new(sailing_oracle("go"));
    let source = Arc::new(sailing_source());

    let mut handlers = sailing::registry(oracle.clone(), source.clone());
    let spy = Arc::new(Spy {
        inner: handlers[sailing::DECISION].clone(),
        seen: Mutex::new(None),
    });
    handlers.insert(sailing::DECISION.into(), spy.clone());

    let outcome = Scheduler::default()
        .run(sailing_graph(), trip_ctx(), &handlers)
        .await
        .expect("sailing run succeeds");

    let seen = spy.seen.lock().unwrap().clone().unwrap();
    assert_eq!(
        seen.keys().collect::<Vec<_>>(),
        vec!["current", "weather", "wind"]
    );
    assert_eq!(seen.signals["current"]["station_id"], "S3");
    assert_eq!(source.attempted_stations(), vec!["S1", "S2", "S3"]);

    let (id, decision) = outcome.terminal_result().unwrap();
    assert_eq!(id, "decision");
    assert!(matches!(decision["action"].as_str(), Some("go") | Some("no-go")));
}

#[tokio::test]
async fn planner_returns_decision_and_supporting_signals() {
    let planner = SailPlanner::new(
        Arc::new(sailing_oracle("no-go")),
        Arc::new(sailing_source()),
        SchedulerConfig::default(),
    )
    .unwrap();

    let plan = planner
        .plan(TripInput::new("Port Orchard Marina", "03/16/2025"))
        .await
        .unwrap();

    assert_eq!(plan.decision.action, Action::NoGo);
    assert_eq!(
        plan.signals.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["current", "station_lookup", "weather", "wind"]
    );
    assert_eq!(plan.report.nodes_with(NodeStatus::Completed).len(), 5);
}

#[tokio::test]
async fn planner_surfaces_exhausted_stations_as_a_node_failure() {
    let planner = SailPlanner::new(
        Arc::new(sailing_oracle("go")),
        Arc::new(StubSource::new()),
        SchedulerConfig::default(),
    )
    .unwrap();

    let err = planner
        .plan(TripInput::new("Port Orchard Marina", "03/16/2025"))
        .await
        .unwrap_err();

    let crate::PlanError::Workflow(err) = err else {
        panic!("expected a workflow failure");
    };
    assert_eq!(err.failed_nodes(), vec!["current"]);
    assert_eq!(err.report().unwrap().status("decision"), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn planner_rejects_a_bad_date_before_calling_the_oracle() {
    let oracle = Arc::new(sailing_oracle("go"));
    let source = Arc::new(sailing_source());
    let planner =
        SailPlanner::new(oracle.clone(), source.clone(), SchedulerConfig::default()).unwrap();

    let err = planner
        .plan(TripInput::new("Port Orchard Marina", "2025-03-16"))
        .await
        .unwrap_err();

    assert!(matches!(err, crate::PlanError::InvalidInput(ref m) if m.contains("2025-03-16")));
    assert!(oracle.requests().is_empty());
    assert!(source.queries().is_empty());
}
