use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{header::HeaderMap, StatusCode};

use crate::error::TransportError;

pub const DEFAULT_BASE_URL: &str = "https://app2.govee.com";
pub const DEVICE_LIST_PATH: &str = "/bff-app/v1/device/list";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated GET against the vendor API, returning the raw body.
///
/// Implementations perform exactly one round trip and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, path: &str, headers: &HeaderMap) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, path: &str, headers: &HeaderMap) -> Result<String, TransportError> {
        let url = self.url(path);
        debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(network_failure)?;

        classify_status(response.status())?;
        response.text().await.map_err(network_failure)
    }
}

/// Maps a response status onto the transport failure taxonomy.
pub fn classify_status(status: StatusCode) -> Result<(), TransportError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(TransportError::Unauthorized(status))
        }
        StatusCode::NOT_FOUND => Err(TransportError::NotFound),
        s if s.is_server_error() => Err(TransportError::ServerError(status)),
        _ => Err(TransportError::UnexpectedStatus(status)),
    }
}

fn network_failure(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    };
    TransportError::NetworkFailure(format!("{kind}: {err}"))
}
