//! Common types used throughout the tap
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// A fully resolved, filtered and date-normalized row
pub type Record = JsonObject;

/// Lazily evaluated sequence of records for one query
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

// ============================================================================
// API Version
// ============================================================================

/// BigCommerce REST API version
///
/// v2 answers with a bare JSON list of rows, v3 wraps rows in a
/// `{"data": [...], "meta": {...}}` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiVersion {
    V2,
    V3,
}

impl ApiVersion {
    /// Path segment used in request URLs
    pub fn segment(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

// ============================================================================
// Replication Method
// ============================================================================

/// Extraction strategy for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    /// Cursor-bounded extraction
    #[default]
    Incremental,
    /// Unconditional extraction of every row
    FullTable,
}

// ============================================================================
// Unknown Quota Policy
// ============================================================================

/// What to do when a page size clamp needs the request quota but the
/// session never observed one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownQuotaPolicy {
    /// Keep the configured default page size and log a warning
    #[default]
    UseDefault,
    /// Refuse to paginate the resource
    Fail,
}
