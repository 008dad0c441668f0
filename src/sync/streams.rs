//! Stream table

use crate::error::{Error, Result};
use crate::types::ReplicationMethod;
use serde::Serialize;

/// Replication keys a stream may be bookmarked on
pub const VALID_REPLICATION_KEYS: [&str; 2] = ["date_modified", "id"];

/// How one resource is replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamDefinition {
    #[serde(rename = "stream")]
    pub name: &'static str,
    pub replication_method: ReplicationMethod,
    pub replication_key: Option<&'static str>,
    pub key_properties: &'static [&'static str],
    /// Rows arrive in ascending replication key order
    #[serde(skip)]
    pub sorted_by_key: bool,
}

impl StreamDefinition {
    /// Incremental streams need a bookmarkable replication key
    pub fn validate(&self) -> Result<()> {
        match (self.replication_method, self.replication_key) {
            (ReplicationMethod::FullTable, _) => Ok(()),
            (ReplicationMethod::Incremental, Some(key)) if VALID_REPLICATION_KEYS.contains(&key) => {
                Ok(())
            }
            (ReplicationMethod::Incremental, key) => Err(Error::config(format!(
                "stream '{}' has invalid replication key {key:?}, expected one of {VALID_REPLICATION_KEYS:?}",
                self.name
            ))),
        }
    }
}

pub static STREAMS: [StreamDefinition; 4] = [
    StreamDefinition {
        name: "products",
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some("date_modified"),
        key_properties: &["id"],
        sorted_by_key: true,
    },
    StreamDefinition {
        name: "coupons",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["id"],
        sorted_by_key: false,
    },
    StreamDefinition {
        name: "customers",
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some("date_modified"),
        key_properties: &["id"],
        sorted_by_key: false,
    },
    StreamDefinition {
        name: "orders",
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some("date_modified"),
        key_properties: &["id"],
        sorted_by_key: true,
    },
];

/// Look up a stream by name
pub fn stream(name: &str) -> Option<&'static StreamDefinition> {
    STREAMS.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod streams_tests {
    use super::*;

    #[test]
    fn test_stream_table_is_valid() {
        for definition in &STREAMS {
            definition.validate().unwrap();
            assert!(crate::endpoints::endpoint(definition.name).is_some());
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            stream("coupons").unwrap().replication_method,
            ReplicationMethod::FullTable
        );
        assert_eq!(stream("orders").unwrap().replication_key, Some("date_modified"));
        assert!(stream("time").is_none());
    }

    #[test]
    fn test_invalid_replication_key() {
        let definition = StreamDefinition {
            name: "orders",
            replication_method: ReplicationMethod::Incremental,
            replication_key: Some("updated_at"),
            key_properties: &["id"],
            sorted_by_key: true,
        };
        assert!(definition.validate().is_err());

        let missing = StreamDefinition {
            replication_key: None,
            ..definition
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let value = serde_json::to_value(stream("coupons").unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "stream": "coupons",
                "replication_method": "FULL_TABLE",
                "replication_key": null,
                "key_properties": ["id"]
            })
        );
    }
}
