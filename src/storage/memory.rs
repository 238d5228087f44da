use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Storage;
use super::records::{ChargingEvent, TelemetryRecord, TripRecord};

/// In-memory [`Storage`] backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    telemetry: Vec<TelemetryRecord>,
    charging_events: Vec<ChargingEvent>,
    trips: Vec<TripRecord>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| anyhow!("storage lock poisoned"))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_telemetry(&self, records: &[TelemetryRecord]) -> Result<()> {
        self.lock()?.telemetry.extend_from_slice(records);
        Ok(())
    }

    async fn latest_telemetry(&self, vin: &str) -> Result<Option<TelemetryRecord>> {
        Ok(self
            .lock()?
            .telemetry
            .iter()
            .filter(|r| r.vin == vin)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn telemetry_since(
        &self,
        vin: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TelemetryRecord>> {
        let mut rows: Vec<_> = self
            .lock()?
            .telemetry
            .iter()
            .filter(|r| r.vin == vin && r.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn insert_charging_events(&self, events: &[ChargingEvent]) -> Result<()> {
        self.lock()?.charging_events.extend_from_slice(events);
        Ok(())
    }

    async fn latest_charging_event(&self, vin: &str) -> Result<Option<ChargingEvent>> {
        Ok(self
            .lock()?
            .charging_events
            .iter()
            .filter(|e| e.vin == vin)
            .max_by_key(|e| e.started_at)
            .cloned())
    }

    async fn charging_events_since(
        &self,
        vin: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChargingEvent>> {
        let mut rows: Vec<_> = self
            .lock()?
            .charging_events
            .iter()
            .filter(|e| e.vin == vin && e.started_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.started_at);
        Ok(rows)
    }

    async fn open_charging_event(
        &self,
        vin: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ChargingEvent>> {
        let mut tables = self.lock()?;
        let already_open = tables
            .charging_events
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
        tables.charging_events.push(event.clone());
        Ok(Some(event))
    }

    async fn insert_trips(&self, trips: &[TripRecord]) -> Result<()> {
        self.lock()?.trips.extend_from_slice(trips);
        Ok(())
    }

    async fn trips_since(&self, vin: &str, since: DateTime<Utc>) -> Result<Vec<TripRecord>> {
        let mut rows: Vec<_> = self
            .lock()?
            .trips
            .iter()
            .filter(|t| t.vin == vin && t.ended_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.ended_at);
        Ok(rows)
    }

    async fn delete_vehicle_history(&self, vin: &str) -> Result<()> {
        let mut tables = self.lock()?;
        tables.telemetry.retain(|r| r.vin != vin);
        tables.charging_events.retain(|e| e.vin != vin);
        tables.trips.retain(|t| t.vin != vin);
        Ok(())
    }
}
