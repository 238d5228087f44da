use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

use super::client::HttpClient;

/// An [`HttpClient`] wrapper that injects `Authorization: Bearer <token>`
/// into every request it executes.
pub struct Bearer<C> {
    inner: C,
    value: String,
}

impl<C> Bearer<C> {
    pub fn new(inner: C, token: &str) -> Self {
        Self {
            inner,
            value: format!("Bearer {token}"),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for Bearer<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(
            AUTHORIZATION,
            self.value.parse().expect("Bearer: invalid header value"),
        );
        self.inner.execute(req).await
    }
}
