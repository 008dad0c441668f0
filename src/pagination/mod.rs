//! Pagination module
//!
//! Page-number pagination over BigCommerce endpoints, with sub-resource
//! resolution and rate limit handling per page.
//!
//! # Overview
//!
//! A [`ResourcePaginator`] runs a small state machine for every page:
//! fetch, optionally wait out the rate limit window, resolve every row's
//! sub-resources, then emit the finished records. A short page ends the
//! stream.

mod paginator;
mod types;

pub use paginator::{decode_rows, ResourcePaginator};
pub use types::{PageState, PaginatorSettings, RecordingSleeper, Sleeper, TokioSleeper};

#[cfg(test)]
mod tests;
