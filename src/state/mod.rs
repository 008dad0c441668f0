//! State management module
//!
//! Handles bookmark tracking and checkpointing.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - Per-stream bookmarks keyed by replication key
//! - `StateManager` - File-based state persistence
//! - Checkpointing for resumable syncs

mod manager;
mod types;

pub use manager::StateManager;
pub use types::State;
