//! End-to-end flows over the public crate surface: simulated snapshots
//! through ingestion, auth failures, seeding totals, and the live fetch
//! path with canned provider responses.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fleet_sync::auth::{AccessToken, AuthConfig, TokenBroker};
use fleet_sync::config::CostModel;
use fleet_sync::error::Error;
use fleet_sync::fleet::FleetClient;
use fleet_sync::http::HttpClient;
use fleet_sync::ingest::{IngestOutcome, ingest};
use fleet_sync::metrics::dashboard_report;
use fleet_sync::mock::{MOCK_VIN, MockLocation, MockOptions, mock_snapshot};
use fleet_sync::seed::{SeedOptions, seed};
use fleet_sync::storage::{CsvStorage, MemoryStorage, Storage};
use fleet_sync::vehicle::VehicleState;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued `(status, body)` responses in order.
struct ReplayClient {
    responses: Mutex<VecDeque<(u16, String)>>,
}

impl ReplayClient {
    fn new(responses: &[(u16, &str)]) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .iter()
                    .map(|(status, body)| (*status, body.to_string()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl HttpClient for ReplayClient {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no canned response left");
        Ok(http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into())
    }
}

fn access_token() -> AccessToken {
    AccessToken::new("at", Utc::now() + Duration::hours(1))
}

#[tokio::test]
async fn test_simulated_charging_snapshot_lands_in_storage() {
    let storage = MemoryStorage::new();
    let options = MockOptions {
        battery_level: Some(50.0),
        charging_state: Some("Charging".to_string()),
        location: Some(MockLocation::SanVincenzo),
        ..Default::default()
    };
    let snapshot = mock_snapshot(&options, &mut StdRng::seed_from_u64(1));

    let outcome = ingest(&storage, &snapshot, MOCK_VIN, true, Utc::now())
        .await
        .unwrap();
    let IngestOutcome::Recorded {
        telemetry,
        charge_session_opened,
    } = outcome
    else {
        panic!("expected a recorded outcome");
    };

    assert!(charge_session_opened);
    assert_eq!(telemetry.soc, 50);
    assert!(telemetry.is_charging);
    assert_eq!(telemetry.lat, Some(43.1906));
    assert_eq!(telemetry.lon, Some(10.5403));

    let stored = storage.latest_telemetry(MOCK_VIN).await.unwrap().unwrap();
    assert_eq!(stored, telemetry);

    let session = storage
        .latest_charging_event(MOCK_VIN)
        .await
        .unwrap()
        .unwrap();
    assert!(session.is_open());
    assert_eq!(session.kwh_added, 0.0);
    assert_eq!(session.cost_eur, 0.0);
}

#[tokio::test]
async fn test_rejected_refresh_surfaces_as_auth_failure() {
    let client = ReplayClient::new(&[(401, r#"{"error":"invalid_grant"}"#)]);
    let broker = TokenBroker::new(
        client,
        AuthConfig::new("client-id", "client-secret", "https://app.example.com/callback"),
    );

    match broker.refresh("stale-token").await.unwrap_err() {
        Error::TokenRefreshFailed { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_thirty_day_seed_produces_expected_totals() {
    let storage = MemoryStorage::new();
    let summary = seed(
        &storage,
        &SeedOptions::new(MOCK_VIN),
        Utc::now(),
        &mut StdRng::seed_from_u64(2),
    )
    .await
    .unwrap();

    assert_eq!(summary.days, 30);
    assert_eq!(summary.trips_written, 120);
    assert_eq!(summary.charges_written, 30);
    assert_eq!(summary.telemetry_written, 2881);
    assert_eq!(summary.total_trip_km, 9000.0);
    assert_eq!(summary.total_trip_kwh, 1350.0);

    let since = DateTime::<Utc>::MIN_UTC;
    assert_eq!(storage.trips_since(MOCK_VIN, since).await.unwrap().len(), 120);
    assert_eq!(
        storage
            .charging_events_since(MOCK_VIN, since)
            .await
            .unwrap()
            .len(),
        30
    );
    assert_eq!(
        storage.telemetry_since(MOCK_VIN, since).await.unwrap().len(),
        2881
    );
}

#[tokio::test]
async fn test_sleeping_vehicle_skips_until_forced() {
    let storage = MemoryStorage::new();
    let snapshot = mock_snapshot(
        &MockOptions {
            state: Some(VehicleState::Asleep),
            ..Default::default()
        },
        &mut StdRng::seed_from_u64(3),
    );

    let outcome = ingest(&storage, &snapshot, MOCK_VIN, false, Utc::now())
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Skipped { .. }));
    assert!(storage.latest_telemetry(MOCK_VIN).await.unwrap().is_none());

    let outcome = ingest(&storage, &snapshot, MOCK_VIN, true, Utc::now())
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Recorded { .. }));
    assert!(storage.latest_telemetry(MOCK_VIN).await.unwrap().is_some());
}

#[tokio::test]
async fn test_live_fetch_through_ingest_persists_a_row() {
    let body = format!(
        r#"{{"response":{{"vin":"{MOCK_VIN}","state":"online","charge_state":{{"battery_level":72.0,"battery_range":237.6,"charging_state":"Disconnected","charger_power":0.0}},"drive_state":{{"latitude":43.0285,"longitude":10.6083}},"vehicle_state":{{"odometer":1501.2}},"climate_state":{{"inside_temp":21.5,"outside_temp":29.0}}}}}}"#
    );
    let fleet = FleetClient::new(ReplayClient::new(&[(200, &body)]));

    let snapshot = fleet
        .fetch_snapshot(&access_token(), MOCK_VIN)
        .await
        .unwrap()
        .unwrap();

    let storage = MemoryStorage::new();
    let outcome = ingest(&storage, &snapshot, MOCK_VIN, false, Utc::now())
        .await
        .unwrap();
    let IngestOutcome::Recorded {
        telemetry,
        charge_session_opened,
    } = outcome
    else {
        panic!("expected a recorded outcome");
    };

    assert!(!charge_session_opened);
    assert_eq!(telemetry.soc, 72);
    assert!((telemetry.range_km - 237.6 * 1.60934).abs() < 1e-9);
    assert_eq!(telemetry.odometer_km, 1501.2);
    assert_eq!(telemetry.lat, Some(43.0285));
}

#[tokio::test]
async fn test_gateway_timeout_means_no_data() {
    for status in [408, 504] {
        let fleet = FleetClient::new(ReplayClient::new(&[(status, "")]));
        let result = fleet
            .fetch_snapshot(&access_token(), MOCK_VIN)
            .await
            .unwrap();
        assert!(result.is_none(), "status {status} should mean no data");
    }
}

#[tokio::test]
async fn test_malformed_payload_means_no_data() {
    let bodies = [
        "not json at all",
        r#"{"response":{"vin":"short","state":"online"}}"#,
        r#"{"response":{}}"#,
    ];
    for body in bodies {
        let fleet = FleetClient::new(ReplayClient::new(&[(200, body)]));
        let result = fleet
            .fetch_snapshot(&access_token(), MOCK_VIN)
            .await
            .unwrap();
        assert!(result.is_none(), "body {body:?} should mean no data");
    }
}

#[tokio::test]
async fn test_seeded_csv_store_feeds_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let storage = CsvStorage::new(dir.path()).unwrap();

    let mut opts = SeedOptions::new(MOCK_VIN);
    opts.days = 3;
    seed(&storage, &opts, Utc::now(), &mut StdRng::seed_from_u64(4))
        .await
        .unwrap();

    let report = dashboard_report(
        &storage,
        MOCK_VIN,
        Utc::now(),
        2,
        7,
        &CostModel::default(),
    )
    .await;

    assert_eq!(report.series.len(), 3 * 96 + 1);
    assert!(report.latest.is_some());
    assert!(report.open_session.is_none());
    assert_eq!(report.weekly.len(), 2);
    let km: f64 = report.weekly.iter().map(|w| w.km).sum();
    assert_eq!(km, 900.0);
}
