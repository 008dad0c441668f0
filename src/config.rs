//! Tap configuration
//!
//! Values are read from a JSON config file. Only the store credentials and
//! the start date are required; every tuning knob has a default.

use crate::error::{Error, Result};
use crate::transform::parse_datetime;
use crate::types::UnknownQuotaPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Production API root; store hash and version are appended per request
pub const DEFAULT_BASE_URL: &str = "https://api.bigcommerce.com/stores";

/// Complete tap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Store identifier (the `stores/<hash>` path segment)
    #[serde(default)]
    pub store_hash: String,

    /// API account client id (`x-auth-client`)
    #[serde(default)]
    pub client_id: String,

    /// API account access token (`x-auth-token`)
    #[serde(default)]
    pub access_token: String,

    /// Lower bound for incremental streams without a stored bookmark
    #[serde(default)]
    pub start_date: String,

    /// API root URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Rows requested per page before any quota clamp
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Headroom subtracted from `quota / sub_resources` when clamping page size
    #[serde(default = "default_sub_resource_margin")]
    pub sub_resource_margin: u32,

    /// Consecutive per-row failures tolerated within one page
    #[serde(default = "default_max_row_errors")]
    pub max_row_errors: u32,

    /// Rate-limited retries of a single page before giving up
    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,

    /// Size of the sub-resource worker pool
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Pause after a skipped row, in milliseconds
    #[serde(default = "default_row_error_delay_ms")]
    pub row_error_delay_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional client-side cap on requests per second
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,

    /// Behaviour when the request quota is unknown at clamp time
    #[serde(default)]
    pub unknown_quota: UnknownQuotaPolicy,

    /// Records between state checkpoints
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_sub_resource_margin() -> u32 {
    5
}

fn default_max_row_errors() -> u32 {
    3
}

fn default_max_fetch_retries() -> u32 {
    5
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_row_error_delay_ms() -> u64 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_checkpoint_every() -> u64 {
    1000
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            store_hash: String::new(),
            client_id: String::new(),
            access_token: String::new(),
            start_date: String::new(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            sub_resource_margin: default_sub_resource_margin(),
            max_row_errors: default_max_row_errors(),
            max_fetch_retries: default_max_fetch_retries(),
            max_concurrent_requests: default_max_concurrent_requests(),
            row_error_delay_ms: default_row_error_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_requests_per_second: None,
            unknown_quota: UnknownQuotaPolicy::default(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

impl TapConfig {
    /// Create a config with credentials and defaults for everything else
    pub fn new(
        store_hash: impl Into<String>,
        client_id: impl Into<String>,
        access_token: impl Into<String>,
        start_date: impl Into<String>,
    ) -> Self {
        Self {
            store_hash: store_hash.into(),
            client_id: client_id.into(),
            access_token: access_token.into(),
            start_date: start_date.into(),
            ..Self::default()
        }
    }

    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate inline config JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("store_hash", &self.store_hash),
            ("client_id", &self.client_id),
            ("access_token", &self.access_token),
            ("start_date", &self.start_date),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        self.start_date()?;
        url::Url::parse(&self.base_url)?;

        if self.page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::invalid_value(
                "max_concurrent_requests",
                "must be at least 1",
            ));
        }
        if self.max_requests_per_second == Some(0) {
            return Err(Error::invalid_value(
                "max_requests_per_second",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }

    /// Parsed start date
    pub fn start_date(&self) -> Result<DateTime<Utc>> {
        parse_datetime(&self.start_date).ok_or_else(|| {
            Error::invalid_value("start_date", format!("unparseable date '{}'", self.start_date))
        })
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pause after a skipped row
    pub fn row_error_delay(&self) -> Duration {
        Duration::from_millis(self.row_error_delay_ms)
    }

    /// Override the API root (used against mock servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the default page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the pause after a skipped row
    #[must_use]
    pub fn with_row_error_delay_ms(mut self, delay_ms: u64) -> Self {
        self.row_error_delay_ms = delay_ms;
        self
    }

    /// Set the unknown quota policy
    #[must_use]
    pub fn with_unknown_quota(mut self, policy: UnknownQuotaPolicy) -> Self {
        self.unknown_quota = policy;
        self
    }
}
