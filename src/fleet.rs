//! Fleet API client for vehicle reads.
//!
//! The data endpoint answers 408 or 504 when the vehicle is asleep or out
//! of coverage. Those are not failures of the pipeline, so
//! [`FleetClient::fetch_snapshot`] folds them, request timeouts, and
//! unparseable payloads into `Ok(None)` and keeps hard errors in `Err`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AccessToken, Region};
use crate::error::Error;
use crate::http::{Bearer, HttpClient};
use crate::vehicle::VehicleSnapshot;

#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

/// Row in the account's vehicle list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub vin: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

pub struct FleetClient<C: HttpClient> {
    http: C,
    base_url: String,
}

impl<C: HttpClient> FleetClient<C> {
    pub fn new(http: C) -> Self {
        Self::for_region(http, Region::Na)
    }

    pub fn for_region(http: C, region: Region) -> Self {
        Self {
            http,
            base_url: region.base_url().to_string(),
        }
    }

    /// Points the client at an arbitrary base URL instead of a region.
    pub fn with_base_url(http: C, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetches the full data snapshot for one vehicle.
    ///
    /// `Ok(None)` means the vehicle cannot answer right now: the request
    /// timed out, the gateway said 408/504, or the payload did not hold the
    /// expected shape. Callers treat `None` as asleep and skip the cycle.
    pub async fn fetch_snapshot(
        &self,
        access: &AccessToken,
        vin: &str,
    ) -> Result<Option<VehicleSnapshot>, Error> {
        let url = Url::parse(&format!(
            "{}/api/1/vehicles/{vin}/vehicle_data",
            self.base_url
        ))?;
        let request = reqwest::Request::new(reqwest::Method::GET, url);
        let response = match Bearer::new(&self.http, access.as_str())
            .execute(request)
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                debug!(vin, "vehicle data request timed out, treating as asleep");
                return Ok(None);
            }
            Err(err) => return Err(Error::Http(err)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            debug!(vin, status = status.as_u16(), "vehicle unreachable, treating as asleep");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::VehicleDataFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        let Some(snapshot) = parse_snapshot(&body) else {
            warn!(vin, "vehicle data payload did not parse, skipping");
            return Ok(None);
        };
        let issues = snapshot.shape_issues();
        if !issues.is_empty() {
            warn!(vin, issues = %issues.join("; "), "vehicle data payload failed shape checks, skipping");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Lists the vehicles on the account.
    pub async fn list_vehicles(&self, access: &AccessToken) -> Result<Vec<VehicleSummary>, Error> {
        let url = Url::parse(&format!("{}/api/1/vehicles", self.base_url))?;
        let request = reqwest::Request::new(reqwest::Method::GET, url);
        let response = Bearer::new(&self.http, access.as_str())
            .execute(request)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::VehicleDataFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let envelope: Envelope<Vec<VehicleSummary>> = response.json().await?;
        Ok(envelope.response)
    }
}

/// Payloads normally arrive wrapped in `{"response": {...}}`; accept a bare
/// object too.
fn parse_snapshot(body: &str) -> Option<VehicleSnapshot> {
    if let Ok(envelope) = serde_json::from_str::<Envelope<VehicleSnapshot>>(body) {
        return Some(envelope.response);
    }
    serde_json::from_str(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct CannedClient {
        responses: Mutex<VecDeque<(u16, String)>>,
        urls: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn new(responses: &[(u16, &str)]) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .iter()
                        .map(|(status, body)| (*status, body.to_string()))
                        .collect(),
                ),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.urls.lock().unwrap().push(req.url().to_string());
            let (status, text) = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| (200, "{}".to_string()));
            Ok(http::Response::builder()
                .status(status)
                .body(text)
                .unwrap()
                .into())
        }
    }

    fn access() -> AccessToken {
        AccessToken::new("at", Utc::now() + Duration::hours(1))
    }

    const VIN: &str = "LRW0MYLRRWD202600";

    fn snapshot_json() -> String {
        format!(
            r#"{{"response":{{"vin":"{VIN}","state":"online","charge_state":{{"battery_level":64.0,"battery_range":200.0,"charging_state":"Disconnected","charger_power":0.0}},"drive_state":{{"latitude":43.19,"longitude":10.54}},"vehicle_state":{{"odometer":920.5}},"climate_state":{{"inside_temp":21.0,"outside_temp":28.0}}}}}}"#
        )
    }

    #[tokio::test]
    async fn test_fetch_hits_vehicle_data_endpoint() {
        let client = FleetClient::new(CannedClient::new(&[(200, &snapshot_json())]));
        let snapshot = client.fetch_snapshot(&access(), VIN).await.unwrap().unwrap();
        assert_eq!(snapshot.vin.as_deref(), Some(VIN));

        let urls = client.http.urls.lock().unwrap();
        assert_eq!(
            urls[0],
            format!("https://fleet-api.prd.na.vn.cloud.tesla.com/api/1/vehicles/{VIN}/vehicle_data")
        );
    }

    #[tokio::test]
    async fn test_region_selects_base_url() {
        let client = FleetClient::for_region(CannedClient::new(&[(200, &snapshot_json())]), Region::Eu);
        client.fetch_snapshot(&access(), VIN).await.unwrap();
        let urls = client.http.urls.lock().unwrap();
        assert!(urls[0].starts_with("https://fleet-api.prd.eu.vn.cloud.tesla.com/"));
    }

    #[tokio::test]
    async fn test_timeout_statuses_mean_asleep() {
        for status in [408, 504] {
            let client = FleetClient::new(CannedClient::new(&[(status, "")]));
            let result = client.fetch_snapshot(&access(), VIN).await.unwrap();
            assert!(result.is_none(), "status {status} should map to None");
        }
    }

    #[tokio::test]
    async fn test_unparseable_payload_means_asleep() {
        for body in ["not json", "{}", r#"{"response":{}}"#] {
            let client = FleetClient::new(CannedClient::new(&[(200, body)]));
            let result = client.fetch_snapshot(&access(), VIN).await.unwrap();
            assert!(result.is_none(), "body {body:?} should map to None");
        }
    }

    #[tokio::test]
    async fn test_server_error_is_a_hard_failure() {
        let client = FleetClient::new(CannedClient::new(&[(500, "upstream exploded")]));
        match client.fetch_snapshot(&access(), VIN).await.unwrap_err() {
            Error::VehicleDataFailed { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bare_payload_without_envelope_parses() {
        let bare = snapshot_json();
        let bare = bare
            .strip_prefix(r#"{"response":"#)
            .and_then(|s| s.strip_suffix('}'))
            .unwrap();
        let client = FleetClient::new(CannedClient::new(&[(200, bare)]));
        let snapshot = client.fetch_snapshot(&access(), VIN).await.unwrap();
        assert!(snapshot.is_some());
    }

    #[tokio::test]
    async fn test_list_vehicles_parses_summaries() {
        let body = format!(
            r#"{{"response":[{{"vin":"{VIN}","display_name":"Ghibli","state":"asleep"}}]}}"#
        );
        let client = FleetClient::new(CannedClient::new(&[(200, &body)]));
        let vehicles = client.list_vehicles(&access()).await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].vin, VIN);
        assert_eq!(vehicles[0].display_name.as_deref(), Some("Ghibli"));
    }
}
