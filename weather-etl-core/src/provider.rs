use crate::model::RawObservation;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// Why a city's observation could not be fetched. Always a per-city skip.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {city} failed with status {status}: {body}")]
    Status {
        city: String,
        status: u16,
        body: String,
    },
    #[error("request for {city} could not be sent: {source}")]
    Transport {
        city: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response for {city} is not valid JSON: {source}")]
    Decode {
        city: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Source of current-weather observations, one request per city.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, city: &str) -> Result<RawObservation, FetchError>;
}
