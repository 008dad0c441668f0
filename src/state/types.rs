//! State types for tracking sync progress
//!
//! Serialized as `{"bookmarks": {"<stream>": {"<field>": <value>}}}` and
//! persisted between runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Bookmarks for every stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream replication key values
    #[serde(default)]
    pub bookmarks: HashMap<String, HashMap<String, Value>>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookmark value of `field` for `stream`
    pub fn get_bookmark(&self, stream: &str, field: &str) -> Option<&Value> {
        self.bookmarks.get(stream)?.get(field)
    }

    /// Set the bookmark value of `field` for `stream`
    pub fn set_bookmark(&mut self, stream: &str, field: &str, value: Value) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }
}
