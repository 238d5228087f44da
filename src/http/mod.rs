//! HTTP plumbing shared by the token broker and the fleet client.
//!
//! [`HttpClient`] is the seam every outbound request flows through; tests
//! substitute canned responses instead of a network.

mod basic;
mod bearer;
mod client;

pub use basic::BasicClient;
pub use bearer::Bearer;
pub use client::HttpClient;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request};

/// Builds a form-encoded POST request, the shape OAuth token endpoints
/// expect.
pub fn form_post(url: &str, params: &[(&str, &str)]) -> Result<Request, url::ParseError> {
    let mut body = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        body.append_pair(key, value);
    }

    let mut req = Request::new(Method::POST, url.parse()?);
    req.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    *req.body_mut() = Some(body.finish().into());
    Ok(req)
}
