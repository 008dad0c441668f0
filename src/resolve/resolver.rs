//! Nested resource resolution
//!
//! v2 rows reference related data through `{"resource": ..., "url": ...}`
//! links. `dispatch` walks a row and starts a fetch for every link without
//! waiting; `resolve` later swaps the results back in. Splitting the two lets
//! a whole page of rows fetch concurrently.

use super::types::{PendingResource, ResourceFetcher, ResourceNode};
use crate::error::Result;
use crate::transform::ExcludedPaths;
use serde_json::Value;
use std::sync::Arc;

/// Replaces sub-resource links with their fetched values
#[derive(Clone)]
pub struct NestedResourceResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    excluded: ExcludedPaths,
}

impl NestedResourceResolver {
    /// Resolver starting fetches through `fetcher`; links under `excluded`
    /// paths are dropped without a request
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, excluded: ExcludedPaths) -> Self {
        Self { fetcher, excluded }
    }

    /// Start a fetch for every link in `row`
    pub fn dispatch(&self, row: Value) -> ResourceNode {
        let mut path = Vec::new();
        self.dispatch_node(row, &mut path)
    }

    /// Dispatch then resolve one row
    pub async fn resolve_row(&self, row: Value) -> Result<Value> {
        self.dispatch(row).resolve().await
    }

    fn dispatch_node(&self, value: Value, path: &mut Vec<String>) -> ResourceNode {
        match value {
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, child) in map {
                    path.push(key);
                    let node = if self.excluded.contains(path) {
                        None
                    } else {
                        Some(self.dispatch_child(child, path))
                    };
                    if let (Some(key), Some(node)) = (path.pop(), node) {
                        entries.push((key, node));
                    }
                }
                ResourceNode::Object(entries)
            }
            Value::Array(items) => ResourceNode::Array(
                items
                    .into_iter()
                    .map(|item| self.dispatch_child(item, path))
                    .collect(),
            ),
            other => ResourceNode::Value(other),
        }
    }

    fn dispatch_child(&self, value: Value, path: &mut Vec<String>) -> ResourceNode {
        match resource_link(&value) {
            Some((resource, url)) => {
                let handle = self.fetcher.dispatch(&url);
                ResourceNode::Pending(PendingResource {
                    resource,
                    url,
                    handle,
                })
            }
            None => self.dispatch_node(value, path),
        }
    }
}

impl std::fmt::Debug for NestedResourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedResourceResolver")
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

/// `(resource, url)` when `value` is a sub-resource link
pub fn resource_link(value: &Value) -> Option<(String, String)> {
    let map = value.as_object()?;
    let resource = match map.get("resource")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let url = map.get("url")?.as_str()?;
    Some((resource, url.to_string()))
}
