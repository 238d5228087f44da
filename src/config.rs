//! Environment-driven configuration.
//!
//! All keys are optional at load time; commands that need a credential ask
//! for it through [`AppConfig::auth_config`] or
//! [`AppConfig::require_refresh_token`] and fail with the missing key's
//! name. Values come from the process environment (after dotenvy has
//! folded in `.env`), but the parsing is lookup-agnostic so tests feed a
//! plain map.

use std::env;
use std::path::PathBuf;

use crate::auth::AuthConfig;
use crate::error::Error;
use crate::mock::MOCK_VIN;

/// Price constants for the cost comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    /// EUR per liter of fuel.
    pub fuel_price_per_liter: f64,
    /// Km a comparable combustion car covers per liter.
    pub fuel_km_per_liter: f64,
    /// EUR per kWh of home charging.
    pub electricity_price_per_kwh: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            fuel_price_per_liter: 1.75,
            fuel_km_per_liter: 15.0,
            electricity_price_per_kwh: 0.15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub vehicle_id: Option<String>,
    pub use_simulation: bool,
    pub cost: CostModel,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let get_f64 =
            |key: &str, default: f64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        let defaults = CostModel::default();
        Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            redirect_uri: get("REDIRECT_URI"),
            refresh_token: get("REFRESH_TOKEN"),
            vehicle_id: get("VEHICLE_ID"),
            use_simulation: get("USE_SIMULATION")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            cost: CostModel {
                fuel_price_per_liter: get_f64(
                    "FUEL_PRICE_PER_LITER",
                    defaults.fuel_price_per_liter,
                ),
                fuel_km_per_liter: get_f64("FUEL_KM_PER_LITER", defaults.fuel_km_per_liter),
                electricity_price_per_kwh: get_f64(
                    "ELECTRICITY_PRICE_PER_KWH",
                    defaults.electricity_price_per_kwh,
                ),
            },
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
        }
    }

    /// Simulation runs when asked for explicitly, or when no real vehicle
    /// is configured.
    pub fn simulation_enabled(&self) -> bool {
        self.use_simulation || self.vehicle_id.is_none()
    }

    /// The vin to operate on: the configured vehicle, else the simulator's.
    pub fn effective_vin(&self) -> &str {
        self.vehicle_id.as_deref().unwrap_or(MOCK_VIN)
    }

    /// OAuth client credentials, required for flows that talk to the
    /// provider.
    pub fn auth_config(&self) -> Result<AuthConfig, Error> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(Error::MissingConfig("CLIENT_ID"))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(Error::MissingConfig("CLIENT_SECRET"))?;
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .ok_or(Error::MissingConfig("REDIRECT_URI"))?;
        Ok(AuthConfig::new(client_id, client_secret, redirect_uri))
    }

    pub fn require_refresh_token(&self) -> Result<&str, Error> {
        self.refresh_token
            .as_deref()
            .ok_or(Error::MissingConfig("REFRESH_TOKEN"))
    }
}
