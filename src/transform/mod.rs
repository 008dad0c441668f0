//! Row transforms
//!
//! Pure functions applied to every resolved row before it is emitted:
//!
//! - `filter_excluded_paths` - drops deprecated or broken fields by exact path
//! - `normalize_dates` - rewrites the API's date formats to canonical UTC
//!
//! Both take the row by reference and build a new value, so the input graph
//! can be shared with other consumers.

mod dates;
mod filter;

pub use dates::{format_datetime, normalize_dates, parse_datetime, CANONICAL_DATETIME_FORMAT};
pub use filter::{filter_excluded_paths, ExcludedPaths, FieldPath};
