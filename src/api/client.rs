use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::{EntryError, SourceResult};

const CLIENT_USER_AGENT: &str = concat!("server-core-downloader/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Unknown tag code '{0}'")]
    UnknownTag(String),

    #[error("Missing {0} key")]
    MissingKey(&'static str),

    #[error("Invalid entry: {0}")]
    InvalidEntry(#[from] EntryError),
}

impl ApiError {
    /// Transport-level failures, as opposed to a reachable source serving bad data.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::RequestError(_) | ApiError::Status(_))
    }
}

impl From<ApiError> for SourceResult {
    fn from(e: ApiError) -> Self {
        if e.is_network() {
            SourceResult::NetworkError(e.to_string())
        } else {
            SourceResult::ParseError(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Shared HTTP client for all catalog sources: fixed header set and a bounded timeout.
#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: Client,
}

impl CatalogClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http })
    }

    /// Issue one GET and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "fetching catalog");

        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(%url, error = %e, "catalog request failed");
            ApiError::RequestError(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "catalog source answered with an error status");
            return Err(ApiError::Status(status));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(%url, error = %e, "catalog response does not match the expected schema");
            ApiError::InvalidResponse(format!("JSON decode error: {}", e))
        })
    }
}
