//! Persistence contract and backends.
//!
//! The pipeline treats storage as a collaborator offering insert,
//! select-latest, select-since, and delete-by-vin shapes, plus one
//! conditional operation ([`Storage::open_charging_event`]) that keeps the
//! at-most-one-open-session invariant safe under concurrent ingestion.
//! [`MemoryStorage`] backs tests and ephemeral runs, [`CsvStorage`] is the
//! durable store for the CLI.

mod csvfile;
mod memory;
mod records;

pub use csvfile::CsvStorage;
pub use memory::MemoryStorage;
pub use records::{ChargingEvent, TelemetryRecord, TripRecord};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn insert_telemetry(&self, records: &[TelemetryRecord]) -> Result<()>;

    /// Most recent sample for the vin, by timestamp.
    async fn latest_telemetry(&self, vin: &str) -> Result<Option<TelemetryRecord>>;

    /// Samples with `timestamp >= since`, ascending.
    async fn telemetry_since(&self, vin: &str, since: DateTime<Utc>)
    -> Result<Vec<TelemetryRecord>>;

    async fn insert_charging_events(&self, events: &[ChargingEvent]) -> Result<()>;

    /// Most recent event for the vin, by start time.
    async fn latest_charging_event(&self, vin: &str) -> Result<Option<ChargingEvent>>;

    /// Events with `started_at >= since`, ascending.
    async fn charging_events_since(
        &self,
        vin: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChargingEvent>>;

    /// Opens a new zero-energy session started at `now` unless the vin
    /// already has an open one. The check and the insert run under one
    /// lock, so two concurrent callers cannot both open.
    ///
    /// Returns the newly opened event, or `None` when one was already open.
    async fn open_charging_event(
        &self,
        vin: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ChargingEvent>>;

    async fn insert_trips(&self, trips: &[TripRecord]) -> Result<()>;

    /// Trips with `ended_at >= since`, ascending. Trips bucket by their
    /// completion time.
    async fn trips_since(&self, vin: &str, since: DateTime<Utc>) -> Result<Vec<TripRecord>>;

    /// Removes every stored row for the vin across all three tables.
    async fn delete_vehicle_history(&self, vin: &str) -> Result<()>;
}
