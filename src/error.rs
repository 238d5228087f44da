//! Error taxonomy for the sync pipeline.
//!
//! Auth failures surface as 401-class results and upstream provider
//! failures as 502-class; local validation rejects with 400. A sleeping
//! vehicle is not an error: the fetcher returns `None` and the pipeline
//! reports a skip.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The provider rejected the authorization-code exchange.
    #[error("token exchange failed with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    /// The provider rejected the refresh-token exchange.
    #[error("token refresh failed with status {status}: {body}")]
    TokenRefreshFailed { status: u16, body: String },

    /// The token response carried no refresh token, so the session layer
    /// has nothing to hold on to.
    #[error("token response did not include a refresh token")]
    MissingRefreshToken,

    /// The OAuth state parameter was absent, expired, or did not match the
    /// one issued. Fails closed; the caller must restart the flow.
    #[error("state parameter missing, expired, or mismatched")]
    InvalidState,

    /// A user-info or region read failed after exhausting the candidate
    /// regions.
    #[error("user info request failed with status {status}")]
    UserinfoFailed { status: u16 },

    /// The vehicle-data endpoint answered with a status that is neither
    /// success nor the timeout class that means "asleep".
    #[error("vehicle data request failed with status {status}: {body}")]
    VehicleDataFailed { status: u16, body: String },

    /// The mapped telemetry record violated the persisted-schema
    /// constraints. Nothing was written.
    #[error("telemetry validation failed: {}", issues.join("; "))]
    ValidationFailed { issues: Vec<String> },

    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Storage(err)
    }
}

impl Error {
    /// Machine-readable reason string for structured error payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::TokenExchangeFailed { .. } => "token_exchange_failed",
            Error::TokenRefreshFailed { .. } => "token_refresh_failed",
            Error::MissingRefreshToken => "missing_refresh_token",
            Error::InvalidState => "invalid_state",
            Error::UserinfoFailed { .. } => "userinfo_failed",
            Error::VehicleDataFailed { .. } => "vehicle_data_failed",
            Error::ValidationFailed { .. } => "validation_failed",
            Error::MissingConfig(_) => "missing_config",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Http(_) => "http_error",
            Error::Storage(_) => "storage_error",
        }
    }

    /// HTTP status class an embedding request handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::TokenExchangeFailed { .. }
            | Error::TokenRefreshFailed { .. }
            | Error::MissingRefreshToken
            | Error::InvalidState => 401,
            Error::UserinfoFailed { .. } | Error::VehicleDataFailed { .. } | Error::Http(_) => 502,
            Error::ValidationFailed { .. } => 400,
            Error::MissingConfig(_) | Error::InvalidUrl(_) | Error::Storage(_) => 500,
        }
    }
}
