//! Sequential fetch → transform → append over a list of cities.

use std::fmt;

use chrono::Utc;
use tokio::sync::watch;

use crate::{
    provider::{FetchError, WeatherProvider},
    store::{StorageError, WeatherStore},
    transform::{TransformError, record_from},
};

/// The only failure that ends a run before any city is attempted.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("could not prepare weather table: {0}")]
    Schema(#[source] StorageError),
}

/// Terminal state of one city within a run.
#[derive(Debug)]
pub enum CityOutcome {
    Saved { id: i64 },
    FetchFailed(FetchError),
    TransformFailed(TransformError),
    SaveFailed(StorageError),
    /// Shutdown was requested before this city was reached.
    NotAttempted,
}

impl CityOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, CityOutcome::Saved { .. })
    }
}

#[derive(Debug)]
pub struct CityReport {
    pub city: String,
    pub outcome: CityOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub saved: usize,
    pub fetch_failed: usize,
    pub transform_failed: usize,
    pub save_failed: usize,
    pub not_attempted: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} fetch failed, {} transform failed, {} save failed",
            self.saved, self.fetch_failed, self.transform_failed, self.save_failed
        )?;
        if self.not_attempted > 0 {
            write!(f, ", {} not attempted", self.not_attempted)?;
        }
        Ok(())
    }
}

/// Per-city outcomes in the order the cities were given.
#[derive(Debug, Default)]
pub struct RunReport {
    pub cities: Vec<CityReport>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        self.cities
            .iter()
            .fold(RunSummary::default(), |mut acc, c| {
                match c.outcome {
                    CityOutcome::Saved { .. } => acc.saved += 1,
                    CityOutcome::FetchFailed(_) => acc.fetch_failed += 1,
                    CityOutcome::TransformFailed(_) => acc.transform_failed += 1,
                    CityOutcome::SaveFailed(_) => acc.save_failed += 1,
                    CityOutcome::NotAttempted => acc.not_attempted += 1,
                }
                acc
            })
    }
}

pub struct Pipeline<P, S> {
    provider: P,
    store: S,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<P, S> Pipeline<P, S>
where
    P: WeatherProvider,
    S: WeatherStore,
{
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            shutdown: None,
        }
    }

    /// Stop between cities once the channel holds `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Process every city once. Per-city failures are logged and recorded in
    /// the report; only a schema failure aborts the run.
    pub async fn run(&self, cities: &[String]) -> Result<RunReport, PipelineError> {
        self.store.ensure_schema().map_err(PipelineError::Schema)?;

        let mut report = RunReport::default();

        for city in cities {
            let outcome = if self.shutdown_requested() {
                CityOutcome::NotAttempted
            } else {
                self.process(city).await
            };
            report.cities.push(CityReport {
                city: city.clone(),
                outcome,
            });
        }

        let summary = report.summary();
        log::info!("Run finished: {summary}");
        Ok(report)
    }

    async fn process(&self, city: &str) -> CityOutcome {
        log::info!("Fetching weather data for {city}...");

        let raw = match self.provider.fetch(city).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Failed to fetch weather data for {city}: {e}");
                return CityOutcome::FetchFailed(e);
            }
        };

        let record = match record_from(&raw, Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping {city}, unusable response: {e}");
                return CityOutcome::TransformFailed(e);
            }
        };

        match self.store.append(&record) {
            Ok(id) => {
                log::info!(
                    "Saved {} ({:.1}°C, {}) as row {id}",
                    record.city,
                    record.temperature_celsius,
                    record.weather_description
                );
                CityOutcome::Saved { id }
            }
            Err(e) => {
                log::error!("Failed to save weather data for {city}: {e}");
                CityOutcome::SaveFailed(e)
            }
        }
    }
}
