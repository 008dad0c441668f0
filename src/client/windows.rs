//! Day windows for the customers resource
//!
//! Customers cannot be sorted by modification date, so they are read one day
//! at a time between the bookmark and now.

use chrono::{DateTime, Duration, Utc};

/// A `[start, end]` window of modification dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// `min_date_modified` / `max_date_modified` query parameters
    pub fn query(&self) -> Vec<(String, String)> {
        vec![
            ("min_date_modified".to_string(), super::iso(self.start)),
            ("max_date_modified".to_string(), super::iso(self.end)),
        ]
    }
}

/// Contiguous one-day windows covering `[start, now]`
///
/// The last window ends at `now`. At least one window is produced even when
/// `start` is not before `now`.
pub fn day_windows(start: DateTime<Utc>, now: DateTime<Utc>) -> Vec<DayWindow> {
    let day = Duration::days(1);
    let span = now.signed_duration_since(start);
    let mut count = span.num_days().max(0);
    if span > Duration::days(count) {
        count += 1;
    }

    (0..count.max(1))
        .map(|n| {
            let window_start = start + Duration::days(n);
            let window_end = (window_start + day).min(now);
            DayWindow {
                start: window_start,
                end: window_end,
            }
        })
        .collect()
}
