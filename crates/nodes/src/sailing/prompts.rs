//! Prompt text for each sailing task.
//!
//! Every builder returns `(system, user)`. The user message always ends with
//! the exact JSON shape expected back so the Oracle's JSON mode has a target.

use serde_json::Value;

use super::signals::TripInput;

pub fn wind(trip: &TripInput) -> (String, String) {
    let system = "You are a meteorologist. Review forecasted wind for a given location and date.\n\
        Make sure your reasoning includes:\n\
        - Wind speed\n\
        - Wind gust speed\n\
        - Wind compass direction"
        .to_string();

    let user = format!(
        "Aggregate wind forecast data for {location} on {date}.\n\n\
         Return JSON exactly in this format:\n\
         {{\n  \"wind_strength\": \"low to high in knots\",\n  \"wind_direction\": \"compass direction\",\n  \"confidence\": float (0-100),\n  \"reasoning\": \"string\"\n}}",
        location = trip.location,
        date = trip.start_date,
    );

    (system, user)
}

pub fn weather(trip: &TripInput) -> (String, String) {
    let system = "You are a meteorologist. Provide the weather forecast for a given date and location.\n\
        Include:\n\
        - Temperature forecast low and high\n\
        - Rain forecast\n\
        - Confidence in prediction"
        .to_string();

    let user = format!(
        "Aggregate weather data for {location} on {date}.\n\n\
         Return JSON exactly in this format:\n\
         {{\n  \"temperature\": \"low to high in Fahrenheit\",\n  \"rain_forecast\": \"string\",\n  \"confidence\": float (0-100),\n  \"reasoning\": \"string\"\n}}",
        location = trip.location,
        date = trip.start_date,
    );

    (system, user)
}

/// Number of ranked stations requested from the Oracle.
pub const STATION_COUNT: usize = 8;

pub fn stations(trip: &TripInput) -> (String, String) {
    let system = format!(
        "Provide a list of the NOAA water level stations closest to {}. \
         Order the response by distance, closest first.",
        trip.location
    );

    let user = format!(
        "What are the closest {STATION_COUNT} NOAA stations to {location}?\n\n\
         Return JSON exactly in this format:\n\
         {{\n  \"station_ids\": [string],\n  \"station_names\": [string],\n  \"station_distances\": [float]\n}}",
        location = trip.location,
    );

    (system, user)
}

pub fn current(trip: &TripInput, station_id: &str, tides: &Value) -> (String, String) {
    let system = format!(
        "You are a seasoned sailor analyzing NOAA tide and current data for {location}, \
         planning a trip on {date}.\n\
         Make sure your reasoning includes:\n\
         - Max current speed\n\
         - Compass direction of current\n\
         - Time of ebb and flood",
        location = trip.location,
        date = trip.start_date,
    );

    let user = format!(
        "Analyze these predictions from station {station_id} for {location} on {date}:\n{tides}\n\n\
         Return JSON exactly in this format:\n\
         {{\n  \"current_speed\": \"low to high in knots\",\n  \"current_direction\": \"compass direction and ebb or flood\",\n  \"confidence\": float (0-100),\n  \"reasoning\": \"string\"\n}}",
        location = trip.location,
        date = trip.start_date,
    );

    (system, user)
}

pub fn decision(trip: &TripInput, signals: &Value) -> (String, String) {
    let system = "You are a seasoned sailor and captain of your ship. You must decide whether to \
        go on a trip based on inputs from your trusted crew. After considering their inputs you \
        alone make the final \"go\" / \"no-go\" call; the safety of the crew depends on it.\n\n\
        Available actions:\n\
        - \"go\": depart.\n\
        - \"no-go\": stay ashore and wait for a better weather window.\n\n\
        How to prioritize inputs:\n\
        - Wind: most important. A steady wind above 25 knots is always \"no-go\"; gusts up to 25 knots are acceptable.\n\
        - Currents: avoid \"go\" if it means sailing against the current; propose a departure window with more favorable currents.\n\
        - Weather: only electrical storms or heavy fog justify \"no-go\"."
        .to_string();

    let user = format!(
        "Based on your crew's analysis of currents, wind and weather make the final call.\n\n\
         Departing from: {from}\nHeading to: {to}\nDate: {date}\n\n\
         Crew signals: {signals}\n\n\
         Return JSON exactly in this format:\n\
         {{\n  \"action\": \"go\" or \"no-go\",\n  \"confidence\": float (0-100),\n  \"reasoning\": \"string\"\n}}",
        from = trip.location,
        to = trip.destination(),
        date = trip.start_date,
    );

    (system, user)
}
