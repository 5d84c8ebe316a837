//! The sailing go/no-go workflow: task ids, dependency edges and runners.
//!
//! ```text
//! station_lookup ──► current ──┐
//! wind ────────────────────────┼──► decision
//! weather ─────────────────────┘
//! ```

pub mod prompts;
pub mod signals;
pub mod tasks;
pub mod tide;

use std::sync::Arc;

use crate::oracle::Oracle;
use crate::source::DataSource;
use crate::traits::TaskRegistry;

pub use signals::{
    Action, CurrentSignal, Decision, StationList, TripInput, WeatherSignal, WindSignal,
};
pub use tasks::{CurrentTask, DecisionTask, StationLookupTask, WeatherTask, WindTask};
pub use tide::TideQuery;

pub const WIND: &str = "wind";
pub const WEATHER: &str = "weather";
pub const STATION_LOOKUP: &str = "station_lookup";
pub const CURRENT: &str = "current";
pub const DECISION: &str = "decision";

/// Every task id, in declaration order.
pub const NODES: [&str; 5] = [WIND, WEATHER, STATION_LOOKUP, CURRENT, DECISION];

/// `(from, to)` pairs: `to` depends on `from`.
pub const EDGES: [(&str, &str); 4] = [
    (STATION_LOOKUP, CURRENT),
    (WIND, DECISION),
    (WEATHER, DECISION),
    (CURRENT, DECISION),
];

/// Runners for every sailing task, backed by the given collaborators.
pub fn registry(oracle: Arc<dyn Oracle>, source: Arc<dyn DataSource>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.insert(WIND.into(), Arc::new(WindTask::new(oracle.clone())));
    registry.insert(WEATHER.into(), Arc::new(WeatherTask::new(oracle.clone())));
    registry.insert(
        STATION_LOOKUP.into(),
        Arc::new(StationLookupTask::new(oracle.clone())),
    );
    registry.insert(
        CURRENT.into(),
        Arc::new(CurrentTask::new(oracle.clone(), source)),
    );
    registry.insert(DECISION.into(), Arc::new(DecisionTask::new(oracle)));
    registry
}
