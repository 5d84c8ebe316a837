//! Typed records produced by the sailing tasks.

use serde::{Deserialize, Deserializer, Serialize};

use crate::oracle::{check_confidence, StructuredOutput};

// ---------------------------------------------------------------------------
// Run input
// ---------------------------------------------------------------------------

/// What the caller asks about: where and when the trip starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripInput {
    pub location: String,
    /// Departure date as `MM/DD/YYYY`.
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location: Option<String>,
}

impl TripInput {
    pub fn new(location: impl Into<String>, start_date: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            start_date: start_date.into(),
            end_location: None,
        }
    }

    /// Destination, defaulting to a round trip.
    pub fn destination(&self) -> &str {
        self.end_location.as_deref().unwrap_or(&self.location)
    }
}

// ---------------------------------------------------------------------------
// Analyst signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindSignal {
    /// Range in knots, e.g. "8 to 14 knots, gusts 20".
    pub wind_strength: String,
    pub wind_direction: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl StructuredOutput for WindSignal {
    const SCHEMA_NAME: &'static str = "wind";

    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSignal {
    /// Low to high in Fahrenheit.
    pub temperature: String,
    pub rain_forecast: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl StructuredOutput for WeatherSignal {
    const SCHEMA_NAME: &'static str = "weather";

    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence)
    }
}

/// Water-level stations ranked closest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationList {
    #[serde(deserialize_with = "ids_as_strings")]
    pub station_ids: Vec<String>,
    pub station_names: Vec<String>,
    pub station_distances: Vec<f64>,
}

impl StructuredOutput for StationList {
    const SCHEMA_NAME: &'static str = "stations";

    fn validate(&self) -> Result<(), String> {
        if self.station_ids.is_empty() {
            return Err("station list is empty".into());
        }
        let n = self.station_ids.len();
        if self.station_names.len() != n || self.station_distances.len() != n {
            return Err(format!(
                "station columns differ in length: {} ids, {} names, {} distances",
                n,
                self.station_names.len(),
                self.station_distances.len()
            ));
        }
        Ok(())
    }
}

/// Station ids come back as numbers or strings depending on the model.
fn ids_as_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Text(s) => s,
            Id::Number(n) => n.to_string(),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSignal {
    /// Range in knots.
    pub current_speed: String,
    /// Compass direction plus ebb or flood.
    pub current_direction: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Station whose predictions were analysed. Filled in by the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
}

impl StructuredOutput for CurrentSignal {
    const SCHEMA_NAME: &'static str = "current";

    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "go", alias = "Go", alias = "GO")]
    Go,
    #[serde(rename = "no-go", alias = "No-Go", alias = "NO-GO", alias = "no_go")]
    NoGo,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Go => f.write_str("go"),
            Action::NoGo => f.write_str("no-go"),
        }
    }
}

/// The captain's final call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
}

impl StructuredOutput for Decision {
    const SCHEMA_NAME: &'static str = "decision";

    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence)
    }
}
