//! Transfer service transport configuration.

use crate::error::{ChBridgeError, redact_url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Address the transfer service listens on by default.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// Configuration for reaching the transfer service.
///
/// # Example
/// ```rust
/// use chbridge_core::backend::BackendConfig;
/// use std::time::Duration;
///
/// let config = BackendConfig::new("http://transfer.internal:8000")
///     .with_request_timeout(Duration::from_secs(60));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(
///     config.endpoint("clickhouse/tables").unwrap().as_str(),
///     "http://transfer.internal:8000/clickhouse/tables"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the service
    pub base_url: String,
    /// Upper bound for one request, including upload and response body
    pub request_timeout: Duration,
    /// Upper bound for establishing the TCP/TLS connection
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BackendConfig({})", redact_url(&self.base_url))
    }
}

impl BackendConfig {
    /// Creates a configuration for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the request timeout.
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to set the connect timeout.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Parsed base URL, always ending in `/` so endpoints join beneath it.
    ///
    /// # Errors
    /// Returns a configuration error for unparseable or non-HTTP URLs.
    pub fn base(&self) -> crate::Result<Url> {
        let mut url = Url::parse(self.base_url.trim()).map_err(|e| {
            ChBridgeError::configuration(format!(
                "invalid transfer service URL {}: {e}",
                redact_url(&self.base_url)
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChBridgeError::configuration(format!(
                "transfer service URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    /// Full URL of one service endpoint.
    ///
    /// # Errors
    /// Returns a configuration error if the base URL is invalid.
    pub fn endpoint(&self, path: &str) -> crate::Result<Url> {
        self.base()?
            .join(path.trim_start_matches('/'))
            .map_err(|e| ChBridgeError::configuration(format!("invalid endpoint '{path}': {e}")))
    }

    /// Validates URL and timeouts.
    ///
    /// # Errors
    /// Returns error if any value is invalid
    pub fn validate(&self) -> crate::Result<()> {
        self.base()?;

        if self.request_timeout.is_zero() {
            return Err(ChBridgeError::configuration(
                "request_timeout must be greater than 0",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(ChBridgeError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}
