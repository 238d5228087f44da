//! Synthetic vehicle snapshots for development and demo setups.
//!
//! The generator is pure: randomness only touches fields the options leave
//! unset, and the RNG is injected, so a seeded source reproduces the same
//! snapshot.

use rand::Rng;

use crate::vehicle::{
    CHARGER_POWER_KW, ChargeState, ClimateState, DriveState, FULL_RANGE_MILES, VehicleSnapshot,
    VehicleState, VehicleStateInfo,
};

/// VIN reported by the simulated vehicle.
pub const MOCK_VIN: &str = "LRW0MYLRRWD202600";

/// Named coordinate pairs the simulator can place the vehicle at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockLocation {
    SanVincenzo,
    Venturina,
    LivornoViaGaribaldi,
}

impl MockLocation {
    pub fn coords(self) -> (f64, f64) {
        match self {
            MockLocation::SanVincenzo => (43.1906, 10.5403),
            MockLocation::Venturina => (43.0285, 10.6083),
            MockLocation::LivornoViaGaribaldi => (43.5519, 10.3184),
        }
    }
}

/// Overrides for [`mock_snapshot`]; unset fields take randomized defaults.
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    pub state: Option<VehicleState>,
    pub battery_level: Option<f64>,
    pub charging_state: Option<String>,
    pub location: Option<MockLocation>,
    pub odometer_km: Option<f64>,
}

/// Produces a schema-valid snapshot of the simulated vehicle.
pub fn mock_snapshot(options: &MockOptions, rng: &mut (impl Rng + ?Sized)) -> VehicleSnapshot {
    let battery_level = options
        .battery_level
        .unwrap_or_else(|| f64::from(rng.gen_range(20..=80)));
    let charging_state = options
        .charging_state
        .clone()
        .unwrap_or_else(|| "Disconnected".to_string());
    let charging = charging_state == "Charging";
    let (lat, lon) = options.location.unwrap_or(MockLocation::SanVincenzo).coords();
    let odometer_km = options
        .odometer_km
        .unwrap_or_else(|| round1(rng.gen_range(1480.0..1560.0)));

    VehicleSnapshot {
        vin: Some(MOCK_VIN.to_string()),
        state: Some(options.state.unwrap_or(VehicleState::Online)),
        charge_state: Some(ChargeState {
            battery_level: Some(battery_level),
            battery_range: Some(round1(battery_level / 100.0 * FULL_RANGE_MILES)),
            charging_state: Some(charging_state),
            charger_power: Some(if charging { CHARGER_POWER_KW } else { 0.0 }),
        }),
        drive_state: Some(DriveState {
            latitude: Some(lat),
            longitude: Some(lon),
            power: None,
        }),
        vehicle_state: Some(VehicleStateInfo {
            odometer: Some(odometer_km),
        }),
        climate_state: Some(ClimateState {
            inside_temp: Some(22.0),
            outside_temp: Some(32.0),
        }),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
