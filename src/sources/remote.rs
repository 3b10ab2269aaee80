//! Remote catalog access.
//!
//! [`CatalogSource`] is the seam between the mirror and the network. The
//! production implementation, [`HttpCatalogSource`], talks to the codeshare
//! site with a blocking reqwest client; tests substitute in-memory sources.

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::model::ProjectDetail;

/// Default catalog location.
pub const DEFAULT_BASE_URL: &str = "https://codeshare.frida.re";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single remote request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status } => *status >= 500 || *status == 429,
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Decode(_) => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Where listing pages and project details come from.
pub trait CatalogSource {
    /// Body of browse page `page` (1-based).
    fn fetch_listing(&self, page: u32) -> Result<String, FetchError>;

    /// Detail record behind `detail_path` (e.g. `/api/project/oleavr/ios-app-info/`).
    fn fetch_detail(&self, detail_path: &str) -> Result<ProjectDetail, FetchError>;
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt` (0-based; the first attempt has none).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }

    /// Run `op`, retrying transient failures until attempts run out.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    tracing::debug!(request = %what, attempt = attempt + 1, error = %err, "retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// [`CatalogSource`] backed by the codeshare HTTP endpoints.
pub struct HttpCatalogSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpCatalogSource {
    /// Build a source for `base_url` where every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("frics/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(FetchError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch_listing(&self, page: u32) -> Result<String, FetchError> {
        let url = format!("{}/browse?page={page}", self.base_url);
        tracing::debug!(url = %url, "fetching listing page");
        self.get(&url)?.text().map_err(FetchError::from_reqwest)
    }

    fn fetch_detail(&self, detail_path: &str) -> Result<ProjectDetail, FetchError> {
        let url = format!("{}{detail_path}", self.base_url);
        tracing::debug!(url = %url, "fetching project detail");
        self.get(&url)?
            .json::<ProjectDetail>()
            .map_err(FetchError::from_reqwest)
    }
}
