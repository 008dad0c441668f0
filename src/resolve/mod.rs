//! Sub-resource resolution
//!
//! Turns rows containing `{"resource", "url"}` links into fully materialized
//! rows. Fetches are started eagerly and awaited later, so every link on a
//! page is in flight at once, bounded by the worker pool behind the fetcher.

mod resolver;
mod types;

pub use resolver::{resource_link, NestedResourceResolver};
pub use types::{FetchHandle, PendingResource, ResourceFetcher, ResourceNode};
