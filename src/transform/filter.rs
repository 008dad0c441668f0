//! Path-based field exclusion

use serde_json::{Map, Value};
use std::fmt;

/// Ordered list of mapping keys from the row root to a field
///
/// List membership does not extend a path: `products[3].sku` is the path
/// `("products", "sku")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Create a path from its segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path segments, root first
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Exact structural match against a traversal path
    pub fn matches(&self, path: &[String]) -> bool {
        self.0 == path
    }
}

impl From<&[&str]> for FieldPath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Set of field paths that must never reach a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedPaths {
    paths: Vec<FieldPath>,
}

impl ExcludedPaths {
    /// Create from field paths
    pub fn new(paths: impl IntoIterator<Item = FieldPath>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Create from a static endpoint table entry
    pub fn from_static(paths: &[&[&str]]) -> Self {
        Self::new(paths.iter().map(|p| FieldPath::from(*p)))
    }

    /// Whether the traversal path is excluded
    pub fn contains(&self, path: &[String]) -> bool {
        self.paths.iter().any(|p| p.matches(path))
    }

    /// True when nothing is excluded
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of excluded paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Remove every mapping entry whose full path is excluded
pub fn filter_excluded_paths(row: &Value, excluded: &ExcludedPaths) -> Value {
    if excluded.is_empty() {
        return row.clone();
    }
    let mut path = Vec::new();
    filter_node(row, excluded, &mut path)
}

fn filter_node(value: &Value, excluded: &ExcludedPaths, path: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                path.push(key.clone());
                if !excluded.contains(path) {
                    out.insert(key.clone(), filter_node(child, excluded, path));
                }
                path.pop();
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| filter_node(item, excluded, path))
                .collect(),
        ),
        other => other.clone(),
    }
}
