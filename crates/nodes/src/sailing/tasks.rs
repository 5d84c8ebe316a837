//! Runners for the sailing workflow.
//!
//! Three shapes appear here:
//! - simple: one Oracle call from the trip input (wind, weather, stations);
//! - chained: ranked tide fetch through the candidate resolver, then an
//!   Oracle call (current);
//! - fan-in: one Oracle call over every visible upstream signal (decision).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::prompts;
use super::signals::{CurrentSignal, Decision, StationList, TripInput, WeatherSignal, WindSignal};
use super::tide::TideQuery;
use super::{CURRENT, STATION_LOOKUP, WEATHER, WIND};
use crate::oracle::{invoke, Oracle};
use crate::resolver::resolve_source;
use crate::source::DataSource;
use crate::traits::{RunContext, Snapshot};
use crate::{NodeError, TaskRunner};

fn to_record<T: Serialize>(signal: &T) -> Result<Value, NodeError> {
    serde_json::to_value(signal).map_err(|e| NodeError::Fatal(format!("cannot encode record: {e}")))
}

// ---------------------------------------------------------------------------
// Simple runners
// ---------------------------------------------------------------------------

pub struct WindTask {
    oracle: Arc<dyn Oracle>,
}

impl WindTask {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl TaskRunner for WindTask {
    async fn execute(&self, ctx: &RunContext, _snapshot: &Snapshot) -> Result<Value, NodeError> {
        let trip: TripInput = ctx.input_as()?;
        let (system, user) = prompts::wind(&trip);
        let signal: WindSignal = invoke(self.oracle.as_ref(), system, user).await?;
        debug!(strength = %signal.wind_strength, direction = %signal.wind_direction, "wind analysed");
        to_record(&signal)
    }
}

pub struct WeatherTask {
    oracle: Arc<dyn Oracle>,
}

impl WeatherTask {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl TaskRunner for WeatherTask {
    async fn execute(&self, ctx: &RunContext, _snapshot: &Snapshot) -> Result<Value, NodeError> {
        let trip: TripInput = ctx.input_as()?;
        let (system, user) = prompts::weather(&trip);
        let signal: WeatherSignal = invoke(self.oracle.as_ref(), system, user).await?;
        to_record(&signal)
    }
}

/// Asks the Oracle for water-level stations ranked by distance.
pub struct StationLookupTask {
    oracle: Arc<dyn Oracle>,
}

impl StationLookupTask {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl TaskRunner for StationLookupTask {
    async fn execute(&self, ctx: &RunContext, _snapshot: &Snapshot) -> Result<Value, NodeError> {
        let trip: TripInput = ctx.input_as()?;
        let (system, user) = prompts::stations(&trip);
        let stations: StationList = invoke(self.oracle.as_ref(), system, user).await?;
        info!(count = stations.station_ids.len(), closest = %stations.station_ids[0], "stations ranked");
        to_record(&stations)
    }
}

// ---------------------------------------------------------------------------
// Chained runner
// ---------------------------------------------------------------------------

/// Fetches tide predictions from the closest station that answers, then asks
/// the Oracle to interpret them.
pub struct CurrentTask {
    oracle: Arc<dyn Oracle>,
    source: Arc<dyn DataSource>,
    max_stations: Option<usize>,
}

impl CurrentTask {
    pub fn new(oracle: Arc<dyn Oracle>, source: Arc<dyn DataSource>) -> Self {
        Self {
            oracle,
            source,
            max_stations: None,
        }
    }

    /// Only try the `n` closest stations.
    pub fn with_max_stations(mut self, n: usize) -> Self {
        self.max_stations = Some(n);
        self
    }
}

#[async_trait]
impl TaskRunner for CurrentTask {
    async fn execute(&self, ctx: &RunContext, snapshot: &Snapshot) -> Result<Value, NodeError> {
        let trip: TripInput = ctx.input_as()?;
        let stations: StationList = snapshot.signal(STATION_LOOKUP)?;
        let window = TideQuery::for_trip(&trip.start_date, None)?;

        let limit = self
            .max_stations
            .unwrap_or(stations.station_ids.len())
            .min(stations.station_ids.len());
        let candidates = &stations.station_ids[..limit];

        let resolved = resolve_source(self.source.as_ref(), candidates, |station: &String| {
            window.for_station(station)
        })
        .await?;

        info!(
            station = %resolved.candidate,
            attempts = resolved.attempts,
            "tide predictions fetched"
        );

        let (system, user) = prompts::current(&trip, &resolved.candidate, &resolved.payload);
        let mut signal: CurrentSignal = invoke(self.oracle.as_ref(), system, user).await?;
        signal.station_id = Some(resolved.candidate);
        to_record(&signal)
    }
}

// ---------------------------------------------------------------------------
// Fan-in runner
// ---------------------------------------------------------------------------

/// The captain: weighs every visible signal and makes the go/no-go call.
pub struct DecisionTask {
    oracle: Arc<dyn Oracle>,
    required: Vec<String>,
}

impl DecisionTask {
    /// A decision that requires the wind, weather and current signals.
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            required: [WIND, WEATHER, CURRENT].iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the set of signals that must be present.
    pub fn requiring<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = ids.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskRunner for DecisionTask {
    async fn execute(&self, ctx: &RunContext, snapshot: &Snapshot) -> Result<Value, NodeError> {
        let trip: TripInput = ctx.input_as()?;

        if let Some(missing) = self.required.iter().find(|id| snapshot.get(id).is_none()) {
            return Err(NodeError::MissingSignal(missing.clone()));
        }

        let signals = Value::Object(
            snapshot
                .signals
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let (system, user) = prompts::decision(&trip, &signals);
        let decision: Decision = invoke(self.oracle.as_ref(), system, user).await?;
        info!(action = %decision.action, confidence = decision.confidence, "decision made");
        to_record(&decision)
    }
}
