//! Append-only storage for observation records.

use crate::model::{ObservationRecord, StoredObservation};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored timestamp {0:?} is not in YYYY-MM-DD HH:MM:SS form")]
    BadTimestamp(String),
    #[error("weather table does not exist")]
    MissingSchema,
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub trait WeatherStore: Send + Sync {
    /// Create the `weather` table if absent. Safe to call on every run.
    fn ensure_schema(&self) -> Result<()>;

    /// Durably append one record and return its identity.
    fn append(&self, record: &ObservationRecord) -> Result<i64>;

    /// Most recent rows first.
    fn recent(&self, limit: usize) -> Result<Vec<StoredObservation>>;
}
