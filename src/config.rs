//! Client configuration.
//!
//! Environment-driven settings for the storefront client core. The
//! embedding application may also build a `StorefrontConfig` directly.

use std::path::PathBuf;

use tracing::warn;

use crate::api::normalize_base_url;
use crate::error::CommerceError;

/// Default read-model refresh interval (seconds).
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;

/// Configuration for a storefront client session.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Storefront server base URL (normalised; scheme added if missing).
    pub base_url: String,
    /// API key sent on every request.
    pub api_key: String,
    /// Customer this session acts for; also the chat sender id.
    pub customer_id: String,
    /// Background read-model refresh cadence.
    pub refresh_interval_secs: u64,
    /// Where rolling log files go; `None` keeps logging console-only.
    pub log_dir: Option<PathBuf>,
}

impl StorefrontConfig {
    pub fn new(base_url: &str, api_key: &str, customer_id: &str) -> Result<Self, CommerceError> {
        if base_url.trim().is_empty() {
            return Err(CommerceError::Api(
                "Storefront not configured: missing server URL".into(),
            ));
        }
        let base_url = normalize_base_url(base_url);
        if api_key.trim().is_empty() {
            return Err(CommerceError::Api(
                "Storefront not configured: missing API key".into(),
            ));
        }
        if customer_id.trim().is_empty() {
            return Err(CommerceError::Api(
                "Storefront not configured: missing customer id".into(),
            ));
        }
        Ok(Self {
            base_url,
            api_key: api_key.trim().to_string(),
            customer_id: customer_id.trim().to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            log_dir: None,
        })
    }

    /// Build from `ATELIER_*` environment variables:
    /// `ATELIER_SERVER_URL`, `ATELIER_API_KEY`, `ATELIER_CUSTOMER_ID`,
    /// plus optional `ATELIER_REFRESH_SECS` and `ATELIER_LOG_DIR`.
    pub fn from_env() -> Result<Self, CommerceError> {
        let base_url = std::env::var("ATELIER_SERVER_URL").unwrap_or_default();
        let api_key = std::env::var("ATELIER_API_KEY").unwrap_or_default();
        let customer_id = std::env::var("ATELIER_CUSTOMER_ID").unwrap_or_default();
        let mut config = Self::new(&base_url, &api_key, &customer_id)?;

        if let Ok(raw) = std::env::var("ATELIER_REFRESH_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.refresh_interval_secs = secs,
                _ => warn!(raw = %raw, "Ignoring invalid ATELIER_REFRESH_SECS"),
            }
        }
        if let Ok(dir) = std::env::var("ATELIER_LOG_DIR") {
            if !dir.trim().is_empty() {
                config.log_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(config)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
