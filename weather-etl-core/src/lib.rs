//! Core library for the `weather-etl` daily job.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeather client behind the `WeatherProvider` trait
//! - Flattening of API payloads into observation records
//! - Append-only storage (SQLite and in-memory)
//! - The sequential pipeline and its cron trigger
//!
//! It is used by `weather-etl-cli`, but can also be driven by an external
//! scheduler through [`Pipeline::run`].

pub mod config;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod schedule;
pub mod store;
pub mod transform;

pub use config::{ClientConfig, Config, ScheduleConfig};
pub use model::{ObservationRecord, RawObservation, StoredObservation};
pub use pipeline::{CityOutcome, CityReport, Pipeline, PipelineError, RunReport, RunSummary};
pub use provider::{FetchError, OpenWeatherClient, WeatherProvider};
pub use schedule::{RetryPolicy, Schedule, ScheduleError};
pub use store::{MemoryStore, SqliteStore, StorageError, WeatherStore};
pub use transform::{TransformError, transform};
