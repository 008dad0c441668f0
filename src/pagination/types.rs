//! Pagination types and traits
//!
//! Page states, tuning knobs and the sleep abstraction the paginator waits
//! through.

use crate::config::TapConfig;
use crate::error::Result;
use crate::types::UnknownQuotaPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Position of the paginator in its per-page cycle
#[derive(Debug)]
pub enum PageState {
    /// Requesting a page
    Fetching { page: u32 },
    /// The server answered 429; wait out the window and fetch the same page
    RateLimited { page: u32 },
    /// Remaining budget cannot cover the page's sub-requests; wait for reset
    Throttled { page: u32, rows: Vec<Value> },
    /// Dispatching and awaiting sub-resources for every row
    Resolving { page: u32, rows: Vec<Value> },
    /// Handing out the page's records; `fetched` is the raw row count
    Emitting {
        page: u32,
        fetched: usize,
        rows: Vec<Result<Value>>,
    },
    Done,
}

impl PageState {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetching { .. } => "fetching",
            Self::RateLimited { .. } => "rate_limited",
            Self::Throttled { .. } => "throttled",
            Self::Resolving { .. } => "resolving",
            Self::Emitting { .. } => "emitting",
            Self::Done => "done",
        }
    }
}

/// Paginator tuning, taken from the tap config
#[derive(Debug, Clone)]
pub struct PaginatorSettings {
    pub sub_resource_margin: u32,
    pub max_row_errors: u32,
    pub max_fetch_retries: u32,
    pub row_error_delay: Duration,
    pub unknown_quota: UnknownQuotaPolicy,
}

impl Default for PaginatorSettings {
    fn default() -> Self {
        Self::from(&TapConfig::default())
    }
}

impl From<&TapConfig> for PaginatorSettings {
    fn from(config: &TapConfig) -> Self {
        Self {
            sub_resource_margin: config.sub_resource_margin,
            max_row_errors: config.max_row_errors,
            max_fetch_retries: config.max_fetch_retries,
            row_error_delay: config.row_error_delay(),
            unknown_quota: config.unknown_quota,
        }
    }
}

// ============================================================================
// Sleeping
// ============================================================================

/// Source of the paginator's pauses
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested pauses and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}
