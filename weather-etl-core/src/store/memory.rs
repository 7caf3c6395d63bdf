use std::sync::Mutex;

use super::{Result, StorageError, WeatherStore};
use crate::model::{ObservationRecord, StoredObservation};

/// In-process store with the same append-only semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    schema_ready: bool,
    next_id: i64,
    rows: Vec<StoredObservation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows in insertion order.
    pub fn rows(&self) -> Vec<StoredObservation> {
        self.inner
            .lock()
            .map(|inner| inner.rows.clone())
            .unwrap_or_default()
    }
}

impl WeatherStore for MemoryStore {
    fn ensure_schema(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        inner.schema_ready = true;
        Ok(())
    }

    fn append(&self, record: &ObservationRecord) -> Result<i64> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        if !inner.schema_ready {
            return Err(StorageError::MissingSchema);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(StoredObservation {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredObservation>> {
        let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.rows.iter().rev().take(limit).cloned().collect())
    }
}
