use rusqlite::{Connection, params, types::Type};
use std::path::{Path, PathBuf};

use super::{Result, StorageError, WeatherStore};
use crate::model::{ObservationRecord, StoredObservation, parse_timestamp};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS weather (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    city                TEXT,
    temperature         REAL,
    feels_like          REAL,
    humidity            INTEGER,
    weather             TEXT,
    weather_description TEXT,
    wind_speed          REAL,
    timestamp           DATETIME
)";

/// Single-file SQLite store. A fresh connection is opened per call and each
/// append commits before returning, so a row survives a later failure.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Connection::open(&self.path)?)
    }
}

impl WeatherStore for SqliteStore {
    fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(())
    }

    fn append(&self, record: &ObservationRecord) -> Result<i64> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO weather (city, temperature, feels_like, humidity, weather, \
             weather_description, wind_speed, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.city,
                record.temperature_celsius,
                record.feels_like_celsius,
                record.humidity_percent,
                record.weather_main,
                record.weather_description,
                record.wind_speed_mps,
                record.captured_at_string(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredObservation>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, city, temperature, feels_like, humidity, weather, \
             weather_description, wind_speed, timestamp \
             FROM weather ORDER BY id DESC LIMIT ?1",
        )?;
        // SQLite treats a negative LIMIT as unbounded; clamp instead of wrapping.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            let timestamp: String = row.get(8)?;
            let captured_at = parse_timestamp(&timestamp).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    Type::Text,
                    Box::new(StorageError::BadTimestamp(timestamp.clone())),
                )
            })?;
            Ok(StoredObservation {
                id: row.get(0)?,
                record: ObservationRecord {
                    city: row.get(1)?,
                    temperature_celsius: row.get(2)?,
                    feels_like_celsius: row.get(3)?,
                    humidity_percent: row.get(4)?,
                    weather_main: row.get(5)?,
                    weather_description: row.get(6)?,
                    wind_speed_mps: row.get(7)?,
                    captured_at,
                },
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }
}
