//! HTTP implementation of the auth status check.
//!
//! `GET {server_url}/auth/is-authenticated.json` answers with 2xx while the
//! session cookie is valid. A 5xx means the service could not answer, which
//! is a transport failure, as are 408 and 429 (the server declined to answer
//! right now). Any other status is an authoritative "no". Redirects are not
//! followed: a 3xx to a login page is a "no", not the login page's 200.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use tracing::debug;
use warden_core::{AuthCheck, TransportError};

const IS_AUTHENTICATED_PATH: &str = "/auth/is-authenticated.json";

pub struct HttpAuthCheck {
    client: reqwest::Client,
    url: String,
    session_cookie: Option<String>,
}

impl HttpAuthCheck {
    pub fn new(
        server_base: &str,
        session_cookie: Option<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {}", err))?;
        Ok(Self {
            client,
            url: format!("{}{}", server_base.trim_end_matches('/'), IS_AUTHENTICATED_PATH),
            session_cookie,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthCheck for HttpAuthCheck {
    async fn check_authenticated(&self) -> Result<bool, TransportError> {
        let mut request = self.client.get(&self.url).header(ACCEPT, "application/json");
        if let Some(cookie) = self.session_cookie.as_deref() {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status().as_u16();
        debug!(status, url = %self.url, "Auth status response");
        classify_status(status)
    }
}

/// Stands in when no server is configured. Every check is a transport
/// failure, which never moves a signed-out phase.
pub struct UnconfiguredAuthCheck;

#[async_trait]
impl AuthCheck for UnconfiguredAuthCheck {
    async fn check_authenticated(&self) -> Result<bool, TransportError> {
        Err(TransportError::Request(
            "no server_url configured".to_string(),
        ))
    }
}

pub fn classify_status(status: u16) -> Result<bool, TransportError> {
    match status {
        200..=299 => Ok(true),
        408 | 429 | 500..=599 => Err(TransportError::ServiceUnavailable { status }),
        _ => Ok(false),
    }
}
