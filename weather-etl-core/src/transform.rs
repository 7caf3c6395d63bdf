//! Raw API payload → flat [`ObservationRecord`].

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;

use crate::model::{ObservationRecord, RawObservation};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("payload is missing or has a mistyped field: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload for {city} has no weather conditions")]
    NoConditions { city: String },
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

/// Transform `raw` stamped with the current UTC time.
///
/// `None` in gives `Ok(None)` out: no record is ever built from an absent
/// observation.
pub fn transform(raw: Option<&RawObservation>) -> Result<Option<ObservationRecord>, TransformError> {
    transform_at(raw, Utc::now())
}

fn transform_at(
    raw: Option<&RawObservation>,
    now: DateTime<Utc>,
) -> Result<Option<ObservationRecord>, TransformError> {
    raw.map(|raw| record_from(raw, now)).transpose()
}

/// Build a record from a present observation, stamped with `now`.
pub(crate) fn record_from(raw: &RawObservation, now: DateTime<Utc>) -> Result<ObservationRecord, TransformError> {
    let parsed = OwCurrentResponse::deserialize(raw.as_json())?;

    // Only the first condition is kept.
    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| TransformError::NoConditions {
            city: parsed.name.clone(),
        })?;

    Ok(ObservationRecord {
        city: parsed.name,
        temperature_celsius: parsed.main.temp,
        feels_like_celsius: parsed.main.feels_like,
        humidity_percent: parsed.main.humidity,
        weather_main: condition.main,
        weather_description: condition.description,
        wind_speed_mps: parsed.wind.speed,
        captured_at: now.trunc_subsecs(0),
    })
}
