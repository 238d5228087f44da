//! CSV-backed [`Storage`] implementation: one file per table under the
//! data directory. Rows append with the header written on first create;
//! deletes rewrite the file. A single lock serializes all file access, so
//! the conditional session open stays atomic.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::Storage;
use super::records::{ChargingEvent, TelemetryRecord, TripRecord};

const TELEMETRY_FILE: &str = "telemetry.csv";
const CHARGING_FILE: &str = "charging_events.csv";
const TRIPS_FILE: &str = "trips.csv";

pub struct CsvStorage {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CsvStorage {
    /// Creates the data directory if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| anyhow!("storage lock poisoned"))
    }

    fn table(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, rows = rows.len(), "Appending CSV rows");

        let file = OpenOptions::new().append(true).create(true).open(path)?;

        let mut writer = WriterBuilder::new()
            .has_headers(!file_exists) // IMPORTANT when appending
            .from_writer(file);

        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        Ok(())
    }

    fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn rewrite_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn retain_other_vins<T: Serialize + DeserializeOwned>(
        path: &Path,
        vin: &str,
        vin_of: impl Fn(&T) -> &str,
    ) -> Result<()> {
        let rows: Vec<T> = Self::read_rows(path)?;
        let kept: Vec<T> = rows.into_iter().filter(|row| vin_of(row) != vin).collect();
        Self::rewrite_rows(path, &kept)
    }
}

#[async_trait]
impl Storage for CsvStorage {
    async fn insert_telemetry(&self, records: &[TelemetryRecord]) -> Result<()> {
        let _guard = self.guard()?;
        Self::append_rows(&self.table(TELEMETRY_FILE), records)
    }

    async fn latest_telemetry(&self, vin: &str) -> Result<Option<TelemetryRecord>> {
        let _guard = self.guard()?;
        let rows: Vec<TelemetryRecord> = Self::read_rows(&self.table(TELEMETRY_FILE))?;
        Ok(rows
            .into_iter()
            .filter(|r| r.vin == vin)
            .max_by_key(|r| r.timestamp))
    }

    async fn telemetry_since(
        &self,
        vin: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TelemetryRecord>> {
        let _guard = self.guard()?;
        let rows: Vec<TelemetryRecord> = Self::read_rows(&self.table(TELEMETRY_FILE))?;
        let mut rows: Vec<_> = rows
            .into_iter()
            .filter(|r| r.vin == vin && r.timestamp >= since)
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn insert_charging_events(&self, events: &[ChargingEvent]) -> Result<()> {
        let _guard = self.guard()?;
        Self::append_rows(&self.table(CHARGING_FILE), events)
    }

    async fn latest_charging_event(&self, vin: &str) -> Result<Option<ChargingEvent>> {
        let _guard = self.guard()?;
        let rows: Vec<ChargingEvent> = Self::read_rows(&self.table(CHARGING_FILE))?;
        Ok(rows
            .into_iter()
            .filter(|e| e.vin == vin)
            .max_by_key(|e| e.started_at))
    }

    async fn charging_events_since(
        &self,
        vin: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChargingEvent>> {
        let _guard = self.guard()?;
        let rows: Vec<ChargingEvent> = Self::read_rows(&self.table(CHARGING_FILE))?;
        let mut rows: Vec<_> = rows
            .into_iter()
            .filter(|e| e.vin == vin && e.started_at >= since)
            .collect();
        rows.sort_by_key(|e| e.started_at);
        Ok(rows)
    }

    async fn open_charging_event(
        &self,
        vin: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ChargingEvent>> {
        let _guard = self.guard()?;
        let path = self.table(CHARGING_FILE);
        let rows: Vec<ChargingEvent> = Self::read_rows(&path)?;
        let already_open = rows
            .iter()
            .filter(|e| e.vin == vin)
            .max_by_key(|e| e.started_at)
            .is_some_and(ChargingEvent::is_open);
        if already_open {
            return Ok(None);
        }

        let event = ChargingEvent {
            vin: vin.to_string(),
            started_at: now,
            ended_at: None,
            kwh_added: 0.0,
            cost_eur: 0.0,
        };
        Self::append_rows(&path, std::slice::from_ref(&event))?;
        Ok(Some(event))
    }

    async fn insert_trips(&self, trips: &[TripRecord]) -> Result<()> {
        let _guard = self.guard()?;
        Self::append_rows(&self.table(TRIPS_FILE), trips)
    }

    async fn trips_since(&self, vin: &str, since: DateTime<Utc>) -> Result<Vec<TripRecord>> {
        let _guard = self.guard()?;
        let rows: Vec<TripRecord> = Self::read_rows(&self.table(TRIPS_FILE))?;
        let mut rows: Vec<_> = rows
            .into_iter()
            .filter(|t| t.vin == vin && t.ended_at >= since)
            .collect();
        rows.sort_by_key(|t| t.ended_at);
        Ok(rows)
    }

    async fn delete_vehicle_history(&self, vin: &str) -> Result<()> {
        let _guard = self.guard()?;
        Self::retain_other_vins::<TelemetryRecord>(&self.table(TELEMETRY_FILE), vin, |r| &r.vin)?;
        Self::retain_other_vins::<ChargingEvent>(&self.table(CHARGING_FILE), vin, |e| &e.vin)?;
        Self::retain_other_vins::<TripRecord>(&self.table(TRIPS_FILE), vin, |t| &t.vin)?;
        Ok(())
    }
}
