// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # BigCommerce Tap
//!
//! Rate-limit aware extraction of BigCommerce store resources.
//!
//! ## Features
//!
//! - **Quota Governor**: Tracks the store's request window from response
//!   headers, sizes pages and pauses before the quota runs out
//! - **Nested Resources**: Resolves `{url, resource}` links in rows through a
//!   bounded worker pool
//! - **Paging State Machine**: Retries rate-limited pages and tolerates
//!   isolated row failures
//! - **Incremental Sync**: Bookmarks per stream, checkpointed as JSON lines
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bigcommerce_tap::{BigCommerceClient, StateManager, StreamSyncer, JsonLinesSink, TapConfig};
//!
//! #[tokio::main]
//! async fn main() -> bigcommerce_tap::Result<()> {
//!     let config = TapConfig::from_file("config.json")?;
//!     let client = BigCommerceClient::connect(config).await?;
//!     let state = StateManager::from_file("state.json")?;
//!
//!     let mut sink = JsonLinesSink::new(std::io::stdout());
//!     StreamSyncer::new(&client, &state).sync_all(&[], &mut sink).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StreamSyncer  bookmarks → RecordSink (RECORD / STATE lines) │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┴───────────────────────────────┐
//! │  BigCommerceClient  orders · products · customers · coupons  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌────────────┬─────────────────┴──┬──────────────┬─────────────┐
//! │ Paginator  │ Resolver           │ Transform    │ HTTP        │
//! ├────────────┼────────────────────┼──────────────┼─────────────┤
//! │ Fetch      │ Link detection     │ Path filter  │ Session     │
//! │ Retry      │ Sub-resource pool  │ Date format  │ Governor    │
//! │ Throttle   │ Ordered resolution │              │ Pacer       │
//! └────────────┴────────────────────┴──────────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the tap
pub mod error;

/// Common types and type aliases
pub mod types;

/// Tap configuration
pub mod config;

/// Resource endpoint table
pub mod endpoints;

/// Field exclusion and date normalization
pub mod transform;

/// HTTP session, quota governor and sub-resource pool
pub mod http;

/// Nested resource resolution
pub mod resolve;

/// Page-by-page resource reading
pub mod pagination;

/// Per-resource replication queries
pub mod client;

/// State management and checkpointing
pub mod state;

/// Stream syncing and output
pub mod sync;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::BigCommerceClient;
pub use config::TapConfig;
pub use error::{Error, Result};
pub use state::StateManager;
pub use sync::{JsonLinesSink, StreamSyncer};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
