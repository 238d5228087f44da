//! CLI entry point for the vehicle telemetry sync tool.
//!
//! Subcommands cover the whole loop: pair the account (`connect` and
//! `exchange`), pull and store one snapshot (`sync`), backfill history
//! (`seed`), and read the dashboard payload back out (`report`). Every
//! command prints one JSON document to stdout; failures print
//! `{"ok": false, ...}` and exit nonzero.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use fleet_sync::auth::{TokenBroker, state};
use fleet_sync::config::AppConfig;
use fleet_sync::error::Error;
use fleet_sync::fleet::FleetClient;
use fleet_sync::http::BasicClient;
use fleet_sync::ingest::{IngestOutcome, ingest};
use fleet_sync::metrics::dashboard_report;
use fleet_sync::mock::{MockOptions, mock_snapshot};
use fleet_sync::seed::{SeedOptions, seed};
use fleet_sync::storage::CsvStorage;
use serde_json::json;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "fleet_sync")]
#[command(about = "Pull vehicle telemetry into local history and report on it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one vehicle snapshot and store it
    Sync {
        /// Record the snapshot even if the vehicle is not online
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
    /// Replace stored history with generated past data
    Seed {
        /// Days of history to generate
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
    /// Print the dashboard payload for the configured vehicle
    Report {
        /// Weeks of savings history
        #[arg(short, long, default_value_t = 8)]
        weeks: usize,

        /// Days of telemetry series
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },
    /// Start account pairing: issue a state and print the authorization URL
    Connect,
    /// Finish account pairing with the code from the redirect
    Exchange {
        /// Authorization code from the callback URL
        #[arg(long)]
        code: String,

        /// State parameter from the callback URL
        #[arg(long)]
        state: String,
    },
    /// Show the account profile, region, and vehicle list
    Account,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fleet_sync.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("fleet_sync.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let result = match cli.command {
        Commands::Sync { force } => run_sync(&config, force).await,
        Commands::Seed { days } => run_seed(&config, days).await,
        Commands::Report { weeks, days } => run_report(&config, weeks, days).await,
        Commands::Connect => run_connect(&config),
        Commands::Exchange { code, state } => run_exchange(&config, &code, &state).await,
        Commands::Account => run_account(&config).await,
    };

    match result {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(err) => {
            error!(reason = err.reason(), error = %err, "command failed");
            let payload = json!({
                "ok": false,
                "reason": err.reason(),
                "error": err.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    }
}

#[tracing::instrument(skip(config))]
async fn run_sync(config: &AppConfig, force: bool) -> Result<serde_json::Value, Error> {
    let storage = CsvStorage::new(&config.data_dir)?;
    let vin = config.effective_vin().to_string();

    let snapshot = if config.simulation_enabled() {
        info!(vin = %vin, "simulation enabled, generating snapshot");
        Some(mock_snapshot(&MockOptions::default(), &mut rand::thread_rng()))
    } else {
        let auth = config.auth_config()?;
        let refresh_token = config.require_refresh_token()?;
        let broker = TokenBroker::new(BasicClient::new(), auth);
        let access = broker.refresh(refresh_token).await?;
        FleetClient::new(BasicClient::new())
            .fetch_snapshot(&access, &vin)
            .await?
    };

    let Some(snapshot) = snapshot else {
        info!(vin = %vin, "vehicle returned no data, nothing stored");
        return Ok(json!({ "ok": true, "skipped": true, "reason": "no_data" }));
    };

    match ingest(&storage, &snapshot, &vin, force, Utc::now()).await? {
        IngestOutcome::Skipped { reason, state } => Ok(json!({
            "ok": true,
            "skipped": true,
            "reason": reason,
            "state": state,
        })),
        IngestOutcome::Recorded {
            telemetry,
            charge_session_opened,
        } => Ok(json!({
            "ok": true,
            "skipped": false,
            "charge_session_opened": charge_session_opened,
            "telemetry": telemetry,
        })),
    }
}

#[tracing::instrument(skip(config))]
async fn run_seed(config: &AppConfig, days: u32) -> Result<serde_json::Value, Error> {
    let storage = CsvStorage::new(&config.data_dir)?;
    let mut opts = SeedOptions::new(config.effective_vin());
    opts.days = days;
    opts.price_per_kwh = config.cost.electricity_price_per_kwh;

    let summary = seed(&storage, &opts, Utc::now(), &mut rand::thread_rng()).await?;
    Ok(json!({ "ok": true, "summary": summary }))
}

#[tracing::instrument(skip(config))]
async fn run_report(
    config: &AppConfig,
    weeks: usize,
    days: u32,
) -> Result<serde_json::Value, Error> {
    let storage = CsvStorage::new(&config.data_dir)?;
    let report = dashboard_report(
        &storage,
        config.effective_vin(),
        Utc::now(),
        weeks,
        days,
        &config.cost,
    )
    .await;
    Ok(json!({ "ok": true, "report": report }))
}

#[tracing::instrument(skip(config))]
fn run_connect(config: &AppConfig) -> Result<serde_json::Value, Error> {
    let auth = config.auth_config()?;
    let broker = TokenBroker::new(BasicClient::new(), auth);

    let pending = state::issue(&config.data_dir, Utc::now())?;
    let url = broker.authorize_url(&pending.state)?;
    Ok(json!({
        "ok": true,
        "authorize_url": url,
        "state": pending.state,
        "valid_minutes": state::STATE_TTL_MINUTES,
    }))
}

#[tracing::instrument(skip_all)]
async fn run_exchange(
    config: &AppConfig,
    code: &str,
    returned_state: &str,
) -> Result<serde_json::Value, Error> {
    let auth = config.auth_config()?;
    state::verify_and_consume(&config.data_dir, returned_state, Utc::now())?;

    let broker = TokenBroker::new(BasicClient::new(), auth);
    let grant = broker.exchange_code(code).await?;
    info!("token exchange complete");

    // Tokens go to stdout only; the log layers never see them.
    Ok(json!({
        "ok": true,
        "access_token": grant.access.as_str(),
        "access_token_expires_at": grant.access.expires_at(),
        "refresh_token": grant.refresh_token,
    }))
}

#[tracing::instrument(skip(config))]
async fn run_account(config: &AppConfig) -> Result<serde_json::Value, Error> {
    let auth = config.auth_config()?;
    let refresh_token = config.require_refresh_token()?;
    let broker = TokenBroker::new(BasicClient::new(), auth);

    let access = broker.refresh(refresh_token).await?;
    let region = broker.account_region(&access).await?;
    let profile = broker.user_profile(&access).await?;
    let vehicles = FleetClient::for_region(BasicClient::new(), region)
        .list_vehicles(&access)
        .await?;

    Ok(json!({
        "ok": true,
        "user": profile,
        "region": region,
        "vehicles": vehicles,
    }))
}
