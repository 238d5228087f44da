//! Normalized vehicle-state model and the constants describing the
//! simulated vehicle.
//!
//! A [`VehicleSnapshot`] is one point-in-time read from the provider (or
//! the simulator) before it is mapped into a persisted telemetry record.
//! Sub-states the provider omits stay `None`; the documented fallbacks are
//! applied during ingestion, not here.

use serde::{Deserialize, Serialize};

/// Miles to kilometers.
pub const MILES_TO_KM: f64 = 1.60934;

/// Rated range at full charge, in miles (the provider's unit).
pub const FULL_RANGE_MILES: f64 = 330.0;

/// Rated range at full charge, in km (the seed model's unit).
pub const FULL_RANGE_KM: f64 = 450.0;

/// Usable pack capacity, in kWh.
pub const BATTERY_CAPACITY_KWH: f64 = 75.0;

/// Average consumption, in Wh per km.
pub const WH_PER_KM: f64 = 150.0;

/// Home charger draw, in kW.
pub const CHARGER_POWER_KW: f64 = 4.6;

/// Connectivity state reported by the provider.
///
/// Deserialization is closed: an unrecognized state string fails the whole
/// payload, which the fetcher then treats as "no data".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleState {
    Online,
    Asleep,
    Offline,
    Waking,
    Unavailable,
}

impl VehicleState {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleState::Online => "online",
            VehicleState::Asleep => "asleep",
            VehicleState::Offline => "offline",
            VehicleState::Waking => "waking",
            VehicleState::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeState {
    /// State of charge, percent.
    pub battery_level: Option<f64>,
    /// Estimated range in miles; converted to km during ingestion.
    pub battery_range: Option<f64>,
    /// Charger connection state, e.g. "Charging" or "Disconnected".
    pub charging_state: Option<String>,
    /// Charger draw in kW while plugged in.
    pub charger_power: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveState {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Instantaneous drivetrain power, kW.
    pub power: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStateInfo {
    pub odometer: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub inside_temp: Option<f64>,
    pub outside_temp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub vin: Option<String>,
    pub state: Option<VehicleState>,
    pub charge_state: Option<ChargeState>,
    pub drive_state: Option<DriveState>,
    pub vehicle_state: Option<VehicleStateInfo>,
    pub climate_state: Option<ClimateState>,
}

impl VehicleSnapshot {
    /// Structural checks mirroring the provider schema: vin and state must
    /// be present, a present vin is exactly 17 characters, and the battery
    /// percentage lies within [0, 100].
    ///
    /// Returns the list of violations; empty means the shape is valid.
    pub fn shape_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        match self.vin.as_deref() {
            None => issues.push("vin is missing".to_string()),
            Some(vin) if vin.len() != 17 => {
                issues.push(format!("vin must be 17 characters, got {}", vin.len()));
            }
            Some(_) => {}
        }

        if self.state.is_none() {
            issues.push("state is missing".to_string());
        }

        if let Some(level) = self.charge_state.as_ref().and_then(|c| c.battery_level) {
            if !(0.0..=100.0).contains(&level) {
                issues.push(format!("battery_level out of range: {level}"));
            }
        }

        issues
    }
}
