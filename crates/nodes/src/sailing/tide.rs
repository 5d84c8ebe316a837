//! Tide-prediction query construction.

use chrono::{Days, NaiveDate};

use crate::source::SourceQuery;
use crate::NodeError;

/// Resource name understood by tide-prediction data sources.
pub const TIDE_PREDICTIONS: &str = "tide_predictions";

/// Date format of trip input.
const INPUT_DATE: &str = "%m/%d/%Y";
/// Date format of the prediction API.
const QUERY_DATE: &str = "%Y%m%d";

/// Prediction window for one trip; produces a query per candidate station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TideQuery {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl TideQuery {
    /// Window starting on `start_date` and ending on `end_date`, or one day
    /// later when no end is given.
    pub fn for_trip(start_date: &str, end_date: Option<&str>) -> Result<Self, NodeError> {
        let begin = parse_date(start_date)?;
        let end = match end_date {
            Some(d) => parse_date(d)?,
            None => next_day(begin)?,
        };

        if end < begin {
            return Err(NodeError::InvalidInput(format!(
                "end date {end_date:?} is before start date {start_date}"
            )));
        }

        Ok(Self { begin, end })
    }

    pub fn for_station(&self, station: &str) -> SourceQuery {
        SourceQuery::new(TIDE_PREDICTIONS)
            .param("product", "predictions")
            .param("station", station)
            .param("datum", "MLLW")
            .param("units", "metric")
            .param("time_zone", "gmt")
            .param("format", "json")
            .param("begin_date", self.begin.format(QUERY_DATE).to_string())
            .param("end_date", self.end.format(QUERY_DATE).to_string())
    }
}

fn next_day(date: NaiveDate) -> Result<NaiveDate, NodeError> {
    date.checked_add_days(Days::new(1))
        .ok_or_else(|| NodeError::InvalidInput(format!("no day follows {date}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, NodeError> {
    NaiveDate::parse_from_str(raw.trim(), INPUT_DATE)
        .map_err(|e| NodeError::InvalidInput(format!("date '{raw}' is not MM/DD/YYYY: {e}")))
}
