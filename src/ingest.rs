//! Ingestion pipeline: one snapshot in, one telemetry row out.
//!
//! The pipeline never writes for a vehicle that is not online unless the
//! caller forces the cycle, and it rejects rows that violate the persisted
//! schema before anything touches storage. Charging sessions open through
//! [`Storage::open_charging_event`], which enforces at most one open
//! session per vin even under concurrent cycles.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Error;
use crate::storage::{Storage, TelemetryRecord};
use crate::vehicle::{MILES_TO_KM, VehicleSnapshot, VehicleState};

/// What one ingestion cycle did.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The vehicle was not online and the cycle was not forced; nothing was
    /// written.
    Skipped { reason: String, state: String },
    /// A telemetry row was persisted.
    Recorded {
        telemetry: TelemetryRecord,
        /// True when this cycle opened a new charging session.
        charge_session_opened: bool,
    },
}

/// Maps a snapshot onto the persisted row shape and stores it.
pub async fn ingest<S: Storage>(
    storage: &S,
    snapshot: &VehicleSnapshot,
    vin: &str,
    force: bool,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, Error> {
    let state_label = snapshot
        .state
        .map(VehicleState::as_str)
        .unwrap_or("unknown");
    if snapshot.state != Some(VehicleState::Online) && !force {
        info!(vin, state = state_label, "vehicle not online, skipping cycle");
        return Ok(IngestOutcome::Skipped {
            reason: "asleep".to_string(),
            state: state_label.to_string(),
        });
    }

    let telemetry = map_snapshot(snapshot, vin, now);
    let issues = telemetry.validation_issues();
    if !issues.is_empty() {
        return Err(Error::ValidationFailed { issues });
    }
    storage
        .insert_telemetry(std::slice::from_ref(&telemetry))
        .await?;

    let mut charge_session_opened = false;
    let drawing_power = telemetry.power_usage_kw.is_some_and(|kw| kw > 0.0);
    if telemetry.is_charging && drawing_power {
        if let Some(event) = storage.open_charging_event(vin, now).await? {
            info!(vin, started_at = %event.started_at, "opened charging session");
            charge_session_opened = true;
        }
    }

    Ok(IngestOutcome::Recorded {
        telemetry,
        charge_session_opened,
    })
}

/// Flattens the nested snapshot into a row. Distances convert from the
/// provider's miles to kilometers here and nowhere else; charger power
/// falls back to drivetrain power when the charger reports nothing.
fn map_snapshot(snapshot: &VehicleSnapshot, vin: &str, now: DateTime<Utc>) -> TelemetryRecord {
    let charge = snapshot.charge_state.clone().unwrap_or_default();
    let drive = snapshot.drive_state.clone().unwrap_or_default();

    TelemetryRecord {
        vin: vin.to_string(),
        timestamp: now,
        soc: charge.battery_level.unwrap_or(0.0).round() as i32,
        odometer_km: snapshot
            .vehicle_state
            .as_ref()
            .and_then(|v| v.odometer)
            .unwrap_or(0.0),
        range_km: charge.battery_range.unwrap_or(0.0) * MILES_TO_KM,
        is_charging: charge.charging_state.as_deref() == Some("Charging"),
        power_usage_kw: charge.charger_power.or(drive.power),
        temp_inside_c: snapshot.climate_state.as_ref().and_then(|c| c.inside_temp),
        lat: drive.latitude,
        lon: drive.longitude,
    }
}
