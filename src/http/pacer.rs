//! Client-side request pacing
//!
//! Optional token bucket in front of every request, for stores whose plan
//! should not be driven at the full server quota. Uses the governor crate.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Token bucket limiting requests per second across a session
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    requests_per_second: u32,
}

impl RequestPacer {
    /// Pace at `requests_per_second`, with a burst of the same size
    pub fn new(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(rate);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            requests_per_second: rate.get(),
        }
    }

    /// Wait until a request may be sent
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}
