use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted telemetry sample. Immutable once written; history is
/// append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub vin: String,
    pub timestamp: DateTime<Utc>,
    /// State of charge, percent.
    pub soc: i32,
    pub odometer_km: f64,
    pub range_km: f64,
    pub is_charging: bool,
    pub power_usage_kw: Option<f64>,
    pub temp_inside_c: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TelemetryRecord {
    /// Persisted-schema constraints checked before any write. Returns the
    /// list of violations; empty means the record may be stored.
    pub fn validation_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.vin.len() != 17 {
            issues.push(format!("vin must be 17 characters, got {}", self.vin.len()));
        }
        if !(0..=100).contains(&self.soc) {
            issues.push(format!("soc out of range: {}", self.soc));
        }
        if self.odometer_km < 0.0 {
            issues.push(format!("odometer_km is negative: {}", self.odometer_km));
        }
        if self.range_km < 0.0 {
            issues.push(format!("range_km is negative: {}", self.range_km));
        }
        issues
    }
}

/// A charging session. `ended_at = None` marks the session as still open;
/// closing and finalizing energy/cost belongs to a later collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingEvent {
    pub vin: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub kwh_added: f64,
    pub cost_eur: f64,
}

impl ChargingEvent {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A completed round trip. Only the seeder writes these; live trip
/// detection is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub vin: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub km: f64,
    pub kwh_consumed: f64,
}
