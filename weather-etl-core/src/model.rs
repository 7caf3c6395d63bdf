use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used for `captured_at` when it is persisted or printed.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Unparsed JSON body of one successful current-weather response.
///
/// Lives only for a single pipeline iteration; the transformer decides
/// whether the payload carries everything a record needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation(pub serde_json::Value);

impl RawObservation {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Flattened observation, one per successfully processed city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// City name as reported by the API, not necessarily the queried string.
    pub city: String,
    pub temperature_celsius: f64,
    pub feels_like_celsius: f64,
    pub humidity_percent: u8,
    pub weather_main: String,
    pub weather_description: String,
    pub wind_speed_mps: f64,
    /// Moment of transformation in UTC, whole seconds.
    pub captured_at: DateTime<Utc>,
}

impl ObservationRecord {
    pub fn captured_at_string(&self) -> String {
        self.captured_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A record as read back from a store, with its surrogate identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObservation {
    pub id: i64,
    pub record: ObservationRecord,
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|ndt| ndt.and_utc())
}
