//! HTTP layer
//!
//! Authenticated session, server rate limit governor, optional client-side
//! pacing and the bounded pool that runs sub-resource fetches.
//!
//! # Features
//!
//! - **Rate limit governor**: tracks the `X-Rate-Limit-*` budget per session
//! - **Request pacing**: optional token bucket using governor
//! - **Sub-resource pool**: semaphore-bounded concurrent GETs

mod client;
mod pacer;
mod pool;
mod rate_limit;

pub use client::{HttpSession, ResponseObserver};
pub use pacer::RequestPacer;
pub use pool::SubResourcePool;
pub use rate_limit::{
    requests_needed, safe_page_size, RateLimitGovernor, RateLimitState, DEFAULT_WINDOW_MS,
    HEADER_REQUESTS_LEFT, HEADER_REQUESTS_QUOTA, HEADER_TIME_RESET_MS, HEADER_TIME_WINDOW_MS,
};
