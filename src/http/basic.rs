use std::time::Duration;

use async_trait::async_trait;

use super::client::HttpClient;

/// Production [`HttpClient`] with bounded request and connect timeouts, so
/// a sleeping vehicle stalls a sync for at most the request timeout.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("BasicClient: reqwest client construction failed");
        Self(client)
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
