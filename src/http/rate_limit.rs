//! Server-declared rate limit tracking
//!
//! BigCommerce reports its request budget on every response through the
//! `X-Rate-Limit-*` headers. Sub-resource requests run concurrently, so
//! readings can arrive out of order; every field is therefore folded in with
//! a minimum, which never relaxes a tighter bound. Once the window that was
//! open at the first reading has elapsed, the next reading starts a new
//! window and replaces the state.

use crate::endpoints::Endpoint;
use crate::error::{Error, Result};
use crate::types::UnknownQuotaPolicy;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const HEADER_TIME_RESET_MS: &str = "x-rate-limit-time-reset-ms";
pub const HEADER_TIME_WINDOW_MS: &str = "x-rate-limit-time-window-ms";
pub const HEADER_REQUESTS_LEFT: &str = "x-rate-limit-requests-left";
pub const HEADER_REQUESTS_QUOTA: &str = "x-rate-limit-requests-quota";

/// Window assumed when a 429 arrives before any window size was reported
pub const DEFAULT_WINDOW_MS: u64 = 30_000;

const UNKNOWN: u64 = u64::MAX;

/// Snapshot of the request budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub requests_remaining: Option<u64>,
    pub requests_quota: Option<u64>,
    pub window_size_ms: Option<u64>,
    pub ms_until_reset: Option<u64>,
}

impl RateLimitState {
    /// Read whichever rate limit headers are present
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
        };
        Self {
            requests_remaining: read(HEADER_REQUESTS_LEFT),
            requests_quota: read(HEADER_REQUESTS_QUOTA),
            window_size_ms: read(HEADER_TIME_WINDOW_MS),
            ms_until_reset: read(HEADER_TIME_RESET_MS),
        }
    }

    /// True when no header was present
    pub fn is_empty(&self) -> bool {
        self.requests_remaining.is_none()
            && self.requests_quota.is_none()
            && self.window_size_ms.is_none()
            && self.ms_until_reset.is_none()
    }
}

/// Requests one page costs: the page itself plus one per sub-resource link per row
pub fn requests_needed(rows: u32, sub_resources: u32) -> u64 {
    u64::from(rows) * (1 + u64::from(sub_resources))
}

/// Largest page whose sub-requests fit in one window's quota
///
/// Never returns less than 1.
pub fn safe_page_size(default: u32, sub_resources: u32, quota: u64, margin: u32) -> u32 {
    if sub_resources == 0 {
        return default;
    }
    let per_window = (quota / u64::from(sub_resources)).saturating_sub(u64::from(margin));
    per_window.min(u64::from(default)).max(1) as u32
}

/// Per-session request budget, updated from the response observation hook
#[derive(Debug)]
pub struct RateLimitGovernor {
    requests_remaining: AtomicU64,
    requests_quota: AtomicU64,
    window_size_ms: AtomicU64,
    ms_until_reset: AtomicU64,
    /// End of the current server window, in ms since `origin`
    window_deadline_ms: AtomicU64,
    /// Page size in effect; only ever shrinks
    page_size: AtomicU32,
    origin: Instant,
}

impl RateLimitGovernor {
    /// Create a governor with nothing observed yet
    pub fn new(default_page_size: u32) -> Self {
        Self {
            requests_remaining: AtomicU64::new(UNKNOWN),
            requests_quota: AtomicU64::new(UNKNOWN),
            window_size_ms: AtomicU64::new(UNKNOWN),
            ms_until_reset: AtomicU64::new(UNKNOWN),
            window_deadline_ms: AtomicU64::new(UNKNOWN),
            page_size: AtomicU32::new(default_page_size.max(1)),
            origin: Instant::now(),
        }
    }

    /// Fold in the rate limit headers of one response
    pub fn observe(&self, headers: &HeaderMap) {
        self.observe_state(RateLimitState::from_headers(headers));
    }

    /// Fold in one reading; absent fields are ignored
    pub fn observe_state(&self, reading: RateLimitState) {
        if reading.is_empty() {
            return;
        }

        let now = self.elapsed_ms();
        let deadline = self.window_deadline_ms.load(Ordering::Acquire);

        if deadline == UNKNOWN {
            if let Some(ms) = reading.ms_until_reset {
                let _ = self.window_deadline_ms.compare_exchange(
                    UNKNOWN,
                    now.saturating_add(ms),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        } else if now >= deadline {
            let next = reading
                .ms_until_reset
                .map_or(UNKNOWN, |ms| now.saturating_add(ms));
            if self
                .window_deadline_ms
                .compare_exchange(deadline, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!(?reading, "rate limit window rolled over");
                self.replace(reading);
                return;
            }
        }

        self.tighten(reading);
    }

    fn tighten(&self, reading: RateLimitState) {
        let fields = [
            (&self.requests_remaining, reading.requests_remaining),
            (&self.requests_quota, reading.requests_quota),
            (&self.window_size_ms, reading.window_size_ms),
            (&self.ms_until_reset, reading.ms_until_reset),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                field.fetch_min(value, Ordering::AcqRel);
            }
        }
    }

    fn replace(&self, reading: RateLimitState) {
        let fields = [
            (&self.requests_remaining, reading.requests_remaining),
            (&self.requests_quota, reading.requests_quota),
            (&self.window_size_ms, reading.window_size_ms),
            (&self.ms_until_reset, reading.ms_until_reset),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                field.store(value, Ordering::Release);
            }
        }
    }

    /// Current budget
    pub fn snapshot(&self) -> RateLimitState {
        let load = |field: &AtomicU64| match field.load(Ordering::Acquire) {
            UNKNOWN => None,
            value => Some(value),
        };
        RateLimitState {
            requests_remaining: load(&self.requests_remaining),
            requests_quota: load(&self.requests_quota),
            window_size_ms: load(&self.window_size_ms),
            ms_until_reset: load(&self.ms_until_reset),
        }
    }

    /// True when `needed` requests would exhaust the current window
    pub fn should_pause(&self, needed: u64) -> bool {
        self.snapshot()
            .requests_remaining
            .is_some_and(|remaining| remaining <= needed)
    }

    /// Time left in the current window
    pub fn pause_duration(&self) -> Duration {
        Duration::from_millis(self.snapshot().ms_until_reset.unwrap_or(0))
    }

    /// Full window plus one second, waited after a 429
    pub fn retry_delay(&self) -> Duration {
        let window = self.snapshot().window_size_ms.unwrap_or(DEFAULT_WINDOW_MS);
        Duration::from_millis(window) + Duration::from_secs(1)
    }

    /// Page size in effect for this session
    pub fn page_size(&self) -> u32 {
        self.page_size.load(Ordering::Acquire)
    }

    /// Shrink the page size; a larger candidate is ignored
    pub fn clamp_page_size(&self, candidate: u32) -> u32 {
        let candidate = candidate.max(1);
        let previous = self.page_size.fetch_min(candidate, Ordering::AcqRel);
        previous.min(candidate)
    }

    /// Page size to use for `endpoint`, clamped by the calibrated quota when
    /// its rows carry sub-resources
    pub fn page_size_for(
        &self,
        endpoint: &Endpoint,
        margin: u32,
        policy: UnknownQuotaPolicy,
    ) -> Result<u32> {
        let current = self.page_size();
        if endpoint.sub_resources == 0 {
            return Ok(current);
        }

        match self.snapshot().requests_quota {
            Some(quota) => {
                let safe = safe_page_size(current, endpoint.sub_resources, quota, margin);
                Ok(self.clamp_page_size(safe))
            }
            None => match policy {
                UnknownQuotaPolicy::UseDefault => {
                    warn!(
                        resource = endpoint.name,
                        page_size = current,
                        "request quota unknown, keeping unclamped page size"
                    );
                    Ok(current)
                }
                UnknownQuotaPolicy::Fail => Err(Error::UnknownQuota {
                    resource: endpoint.name.to_string(),
                }),
            },
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use crate::endpoints::{COUPONS, ORDERS};
    use reqwest::header::HeaderValue;

    fn reading(remaining: u64, reset_ms: u64) -> RateLimitState {
        RateLimitState {
            requests_remaining: Some(remaining),
            requests_quota: Some(150),
            window_size_ms: Some(30_000),
            ms_until_reset: Some(reset_ms),
        }
    }

    #[test]
    fn test_state_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_REQUESTS_LEFT, HeaderValue::from_static("120"));
        headers.insert(HEADER_REQUESTS_QUOTA, HeaderValue::from_static("150"));
        headers.insert(HEADER_TIME_RESET_MS, HeaderValue::from_static("2500"));
        headers.insert(HEADER_TIME_WINDOW_MS, HeaderValue::from_static("garbage"));

        let state = RateLimitState::from_headers(&headers);
        assert_eq!(state.requests_remaining, Some(120));
        assert_eq!(state.requests_quota, Some(150));
        assert_eq!(state.ms_until_reset, Some(2500));
        assert_eq!(state.window_size_ms, None);
        assert!(RateLimitState::from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_requests_needed() {
        assert_eq!(requests_needed(50, 3), 200);
        assert_eq!(requests_needed(50, 0), 50);
        assert_eq!(requests_needed(0, 3), 0);
    }

    #[test]
    fn test_safe_page_size() {
        assert_eq!(safe_page_size(50, 3, 150, 5), 45);
        assert!(safe_page_size(50, 3, 150, 5) <= 150 / 3 - 5);
        assert_eq!(safe_page_size(50, 3, 30_000, 5), 50);
        assert_eq!(safe_page_size(50, 0, 10, 5), 50);
        assert_eq!(safe_page_size(50, 3, 9, 5), 1);
    }

    #[tokio::test]
    async fn test_observe_is_monotone_within_window() {
        let governor = RateLimitGovernor::new(50);
        governor.observe_state(reading(100, 20_000));
        governor.observe_state(reading(90, 19_000));
        governor.observe_state(reading(95, 19_500));

        let state = governor.snapshot();
        assert_eq!(state.requests_remaining, Some(90));
        assert_eq!(state.ms_until_reset, Some(19_000));
    }

    #[tokio::test]
    async fn test_observe_ignores_absent_fields() {
        let governor = RateLimitGovernor::new(50);
        governor.observe_state(reading(100, 20_000));
        governor.observe_state(RateLimitState {
            requests_remaining: Some(80),
            ..RateLimitState::default()
        });

        let state = governor.snapshot();
        assert_eq!(state.requests_remaining, Some(80));
        assert_eq!(state.requests_quota, Some(150));
        assert_eq!(state.window_size_ms, Some(30_000));
    }

    #[tokio::test]
    async fn test_new_window_replaces_state() {
        let governor = RateLimitGovernor::new(50);
        governor.observe_state(reading(3, 0));
        // deadline is "now"; the next reading opens a fresh window
        governor.observe_state(reading(149, 30_000));
        assert_eq!(governor.snapshot().requests_remaining, Some(149));

        governor.observe_state(reading(148, 29_000));
        governor.observe_state(reading(149, 29_500));
        assert_eq!(governor.snapshot().requests_remaining, Some(148));
    }

    #[tokio::test]
    async fn test_should_pause() {
        let governor = RateLimitGovernor::new(50);
        assert!(!governor.should_pause(1_000));

        governor.observe_state(reading(200, 10_000));
        assert!(!governor.should_pause(199));
        assert!(governor.should_pause(200));
        assert_eq!(governor.pause_duration(), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_retry_delay() {
        let governor = RateLimitGovernor::new(50);
        assert_eq!(
            governor.retry_delay(),
            Duration::from_millis(DEFAULT_WINDOW_MS + 1_000)
        );
        governor.observe_state(reading(0, 1_000));
        assert_eq!(governor.retry_delay(), Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_page_size_only_shrinks() {
        let governor = RateLimitGovernor::new(50);
        assert_eq!(governor.clamp_page_size(45), 45);
        assert_eq!(governor.clamp_page_size(50), 45);
        assert_eq!(governor.clamp_page_size(0), 1);
        assert_eq!(governor.page_size(), 1);
    }

    #[tokio::test]
    async fn test_page_size_for_endpoint() {
        let governor = RateLimitGovernor::new(50);
        governor.observe_state(reading(150, 30_000));

        assert_eq!(
            governor
                .page_size_for(&COUPONS, 5, UnknownQuotaPolicy::Fail)
                .unwrap(),
            50
        );
        assert_eq!(
            governor
                .page_size_for(&ORDERS, 5, UnknownQuotaPolicy::Fail)
                .unwrap(),
            45
        );
        // coupons after orders keeps the smaller size
        assert_eq!(
            governor
                .page_size_for(&COUPONS, 5, UnknownQuotaPolicy::Fail)
                .unwrap(),
            45
        );
    }

    #[tokio::test]
    async fn test_page_size_unknown_quota_policy() {
        let governor = RateLimitGovernor::new(50);
        assert_eq!(
            governor
                .page_size_for(&ORDERS, 5, UnknownQuotaPolicy::UseDefault)
                .unwrap(),
            50
        );
        let err = governor
            .page_size_for(&ORDERS, 5, UnknownQuotaPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownQuota { resource } if resource == "orders"));
    }
}
