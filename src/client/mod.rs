//! Replication client
//!
//! Public entry point for reading BigCommerce resources as record streams.

mod bigcommerce;
mod windows;

pub use bigcommerce::BigCommerceClient;
pub use windows::{day_windows, DayWindow};

use chrono::{DateTime, SecondsFormat, Utc};

/// ISO 8601 timestamp as sent in filter parameters
pub(crate) fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}
