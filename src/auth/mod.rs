//! OAuth token broker for the fleet API.
//!
//! Three grant flows live here: the user-facing authorize URL, the
//! authorization-code exchange (fleet auth host, NA audience), and the
//! refresh grant (public auth host). User-info reads try NA first and
//! fall back to EU when the region rejects the token.

pub mod state;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::http::{Bearer, HttpClient, form_post};

pub const AUTHORIZE_URL: &str = "https://auth.tesla.com/oauth2/v3/authorize";
pub const REFRESH_TOKEN_URL: &str = "https://auth.tesla.com/oauth2/v3/token";
pub const EXCHANGE_TOKEN_URL: &str = "https://fleet-auth.prd.vn.cloud.tesla.com/oauth2/v3/token";
pub const SCOPES: &str = "openid offline_access user_data vehicle_device_data vehicle_location";

/// Regions tried for user-info reads, in order.
pub const USERINFO_FALLBACK: [Region; 2] = [Region::Na, Region::Eu];

/// Fleet API region. Determines which base URL vehicle requests go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Na,
    Eu,
    Cn,
}

impl Region {
    pub fn base_url(self) -> &'static str {
        match self {
            Region::Na => "https://fleet-api.prd.na.vn.cloud.tesla.com",
            Region::Eu => "https://fleet-api.prd.eu.vn.cloud.tesla.com",
            Region::Cn => "https://fleet-api.prd.cn.vn.cloud.tesla.cn",
        }
    }

    /// Parses the region string the API reports. The API sends lowercase;
    /// accept any casing.
    pub fn parse(value: &str) -> Option<Region> {
        match value.to_ascii_lowercase().as_str() {
            "na" => Some(Region::Na),
            "eu" => Some(Region::Eu),
            "cn" => Some(Region::Cn),
            _ => None,
        }
    }
}

/// Bearer token plus expiry. `Debug` redacts the secret so the value can
/// ride through tracing fields without leaking.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of a code exchange: the access token plus the refresh token the
/// caller must store for later `sync` runs.
#[derive(Clone)]
pub struct TokenGrant {
    pub access: AccessToken,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access", &self.access)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// Client credentials and endpoints for the OAuth flows. Endpoint fields
/// default to production and exist as fields so tests can point the broker
/// at canned servers.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub refresh_token_url: String,
    pub exchange_token_url: String,
    pub scopes: String,
}

impl AuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: AUTHORIZE_URL.to_string(),
            refresh_token_url: REFRESH_TOKEN_URL.to_string(),
            exchange_token_url: EXCHANGE_TOKEN_URL.to_string(),
            scopes: SCOPES.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct RegionEnvelope {
    #[serde(default)]
    response: RegionPayload,
}

#[derive(Default, Deserialize)]
struct RegionPayload {
    #[serde(default)]
    region: Option<String>,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    response: UserProfile,
}

/// Coordinates the OAuth flows against the provider's auth hosts.
pub struct TokenBroker<C: HttpClient> {
    http: C,
    config: AuthConfig,
}

impl<C: HttpClient> TokenBroker<C> {
    pub fn new(http: C, config: AuthConfig) -> Self {
        Self { http, config }
    }

    /// Builds the authorization URL the user opens in a browser.
    pub fn authorize_url(&self, state: &str) -> Result<String, Error> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.config.scopes.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.to_string())
    }

    /// Trades an authorization code for tokens.
    ///
    /// The `audience` parameter pins which fleet base the access token is
    /// valid against; exchange always runs through the NA fleet auth host.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, Error> {
        let request = form_post(
            &self.config.exchange_token_url,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("audience", Region::Na.base_url()),
            ],
        )?;
        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::TokenExchangeFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: TokenResponse = response.json().await?;
        let refresh_token = parsed.refresh_token.ok_or(Error::MissingRefreshToken)?;
        Ok(TokenGrant {
            access: access_from(parsed.access_token, parsed.expires_in),
            refresh_token,
        })
    }

    /// Refreshes an access token. This grant goes through the public auth
    /// host and carries the same client credentials as the exchange.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, Error> {
        let request = form_post(
            &self.config.refresh_token_url,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ],
        )?;
        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::TokenRefreshFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: TokenResponse = response.json().await?;
        Ok(access_from(parsed.access_token, parsed.expires_in))
    }

    /// Looks up the account's home region. Missing or unrecognized values
    /// resolve to NA, which is what the API does for legacy accounts.
    pub async fn account_region(&self, access: &AccessToken) -> Result<Region, Error> {
        let url = format!("{}/api/1/region", Region::Na.base_url());
        let request = reqwest::Request::new(reqwest::Method::GET, Url::parse(&url)?);
        let response = Bearer::new(&self.http, access.as_str())
            .execute(request)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UserinfoFailed {
                status: status.as_u16(),
            });
        }

        let envelope: RegionEnvelope = response.json().await?;
        Ok(envelope
            .response
            .region
            .as_deref()
            .and_then(Region::parse)
            .unwrap_or(Region::Na))
    }

    /// Reads the account profile, trying each fallback region in order.
    ///
    /// Only 401/403 moves on to the next region; any other failure aborts
    /// immediately since the remaining regions would answer the same.
    pub async fn user_profile(&self, access: &AccessToken) -> Result<UserProfile, Error> {
        let client = Bearer::new(&self.http, access.as_str());
        let mut last_status = 0;
        for region in USERINFO_FALLBACK {
            let url = format!("{}/api/1/users/me", region.base_url());
            let request = reqwest::Request::new(reqwest::Method::GET, Url::parse(&url)?);
            let response = client.execute(request).await?;
            let status = response.status();

            if status.is_success() {
                let envelope: ProfileEnvelope = response.json().await?;
                return Ok(envelope.response);
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                debug!(?region, status = status.as_u16(), "user info rejected, trying next region");
                last_status = status.as_u16();
                continue;
            }
            return Err(Error::UserinfoFailed {
                status: status.as_u16(),
            });
        }
        Err(Error::UserinfoFailed {
            status: last_status,
        })
    }
}

fn access_from(token: String, expires_in: Option<i64>) -> AccessToken {
    let expires_at = Utc::now() + Duration::seconds(expires_in.unwrap_or(3600));
    AccessToken::new(token, expires_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::AUTHORIZATION;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Seen {
        url: String,
        auth: Option<String>,
        body: String,
    }

    /// Replays queued `(status, body)` responses and records every request.
    struct ReplayClient {
        responses: Mutex<VecDeque<(u16, String)>>,
        seen: Mutex<Vec<Seen>>,
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
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ReplayClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let body = req
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            self.seen.lock().unwrap().push(Seen {
                url: req.url().to_string(),
                auth: req
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned),
                body,
            });

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

    fn config() -> AuthConfig {
        AuthConfig::new("client-id", "client-secret", "https://app.example.com/callback")
    }

    #[test]
    fn test_authorize_url_carries_client_and_state() {
        let broker = TokenBroker::new(ReplayClient::new(&[]), config());
        let url = broker.authorize_url("state-123").unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("auth.tesla.com"));
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-id".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("state".to_string(), "state-123".to_string())));
        assert!(pairs.contains(&("scope".to_string(), SCOPES.to_string())));
    }

    #[tokio::test]
    async fn test_exchange_posts_code_with_na_audience() {
        let client = ReplayClient::new(&[(
            200,
            r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":300}"#,
        )]);
        let broker = TokenBroker::new(client, config());

        let grant = broker.exchange_code("the-code").await.unwrap();
        assert_eq!(grant.access.as_str(), "at-1");
        assert_eq!(grant.refresh_token, "rt-1");

        let seen = broker.http.seen.lock().unwrap();
        assert_eq!(seen[0].url, EXCHANGE_TOKEN_URL);
        assert!(seen[0].body.contains("grant_type=authorization_code"));
        assert!(seen[0].body.contains("code=the-code"));
        assert!(seen[0].body.contains("client_secret=client-secret"));
        assert!(
            seen[0]
                .body
                .contains("audience=https%3A%2F%2Ffleet-api.prd.na.vn.cloud.tesla.com")
        );
    }

    #[tokio::test]
    async fn test_exchange_without_refresh_token_fails() {
        let client = ReplayClient::new(&[(200, r#"{"access_token":"at-1"}"#)]);
        let broker = TokenBroker::new(client, config());

        let err = broker.exchange_code("the-code").await.unwrap_err();
        assert!(matches!(err, Error::MissingRefreshToken));
    }

    #[tokio::test]
    async fn test_exchange_rejection_keeps_status_and_body() {
        let client = ReplayClient::new(&[(401, "invalid client")]);
        let broker = TokenBroker::new(client, config());

        match broker.exchange_code("the-code").await.unwrap_err() {
            Error::TokenExchangeFailed { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid client");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_sends_full_client_credentials() {
        let client = ReplayClient::new(&[(200, r#"{"access_token":"at-2","expires_in":600}"#)]);
        let broker = TokenBroker::new(client, config());

        let access = broker.refresh("rt-stored").await.unwrap();
        assert_eq!(access.as_str(), "at-2");
        assert!(!access.is_expired(Utc::now()));

        let seen = broker.http.seen.lock().unwrap();
        assert_eq!(seen[0].url, REFRESH_TOKEN_URL);
        assert!(seen[0].body.contains("grant_type=refresh_token"));
        assert!(seen[0].body.contains("refresh_token=rt-stored"));
        assert!(seen[0].body.contains("client_id=client-id"));
        assert!(seen[0].body.contains("client_secret=client-secret"));
    }

    #[tokio::test]
    async fn test_refresh_rejection_maps_to_refresh_error() {
        let client = ReplayClient::new(&[(401, r#"{"error":"invalid_grant"}"#)]);
        let broker = TokenBroker::new(client, config());

        match broker.refresh("rt-stale").await.unwrap_err() {
            Error::TokenRefreshFailed { status, .. } => assert_eq!(status, 401),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_profile_falls_back_to_eu_on_unauthorized() {
        let client = ReplayClient::new(&[
            (401, ""),
            (200, r#"{"response":{"email":"o@example.com","full_name":"O"}}"#),
        ]);
        let broker = TokenBroker::new(client, config());
        let access = AccessToken::new("at", Utc::now() + Duration::hours(1));

        let profile = broker.user_profile(&access).await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("o@example.com"));

        let seen = broker.http.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].url.contains("fleet-api.prd.na"));
        assert!(seen[1].url.contains("fleet-api.prd.eu"));
        assert_eq!(seen[0].auth.as_deref(), Some("Bearer at"));
        assert_eq!(seen[1].auth.as_deref(), Some("Bearer at"));
    }

    #[tokio::test]
    async fn test_profile_server_error_stops_without_fallback() {
        let client = ReplayClient::new(&[(500, "boom")]);
        let broker = TokenBroker::new(client, config());
        let access = AccessToken::new("at", Utc::now() + Duration::hours(1));

        match broker.user_profile(&access).await.unwrap_err() {
            Error::UserinfoFailed { status } => assert_eq!(status, 500),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(broker.http.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_exhausted_reports_last_status() {
        let client = ReplayClient::new(&[(401, ""), (403, "")]);
        let broker = TokenBroker::new(client, config());
        let access = AccessToken::new("at", Utc::now() + Duration::hours(1));

        match broker.user_profile(&access).await.unwrap_err() {
            Error::UserinfoFailed { status } => assert_eq!(status, 403),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_region_lookup_parses_and_defaults() {
        let client = ReplayClient::new(&[(200, r#"{"response":{"region":"eu"}}"#)]);
        let broker = TokenBroker::new(client, config());
        let access = AccessToken::new("at", Utc::now() + Duration::hours(1));
        assert_eq!(broker.account_region(&access).await.unwrap(), Region::Eu);

        let client = ReplayClient::new(&[(200, "{}")]);
        let broker = TokenBroker::new(client, config());
        assert_eq!(broker.account_region(&access).await.unwrap(), Region::Na);
    }

    #[test]
    fn test_region_parse_is_case_insensitive() {
        assert_eq!(Region::parse("na"), Some(Region::Na));
        assert_eq!(Region::parse("EU"), Some(Region::Eu));
        assert_eq!(Region::parse("Cn"), Some(Region::Cn));
        assert_eq!(Region::parse("mars"), None);
    }

    #[test]
    fn test_token_debug_output_is_redacted() {
        let access = AccessToken::new("very-secret", Utc::now());
        let grant = TokenGrant {
            access: access.clone(),
            refresh_token: "also-secret".to_string(),
        };
        let text = format!("{access:?} {grant:?}");
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("also-secret"));
        assert!(text.contains("<redacted>"));
    }
}
