//! Endpoint descriptors
//!
//! Static table reconciling the two API versions: which version serves a
//! resource, where, how many sub-resource links each row carries, which
//! fields are broken or deprecated, and which fields hold dates.

use crate::transform::ExcludedPaths;
use crate::types::ApiVersion;

/// Description of one paginated resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Resource name
    pub name: &'static str,
    /// API version serving the resource
    pub version: ApiVersion,
    /// Path below `/v{version}/`
    pub path: &'static str,
    /// Sub-resource links per row (each costs one extra request)
    pub sub_resources: u32,
    /// Field paths removed from every row
    pub exclude_paths: &'static [&'static [&'static str]],
    /// Keys whose values are normalized to canonical UTC
    pub date_fields: &'static [&'static str],
}

impl Endpoint {
    /// Excluded paths as a matcher
    pub fn excluded_paths(&self) -> ExcludedPaths {
        ExcludedPaths::from_static(self.exclude_paths)
    }
}

pub const ORDERS: Endpoint = Endpoint {
    name: "orders",
    version: ApiVersion::V2,
    path: "orders",
    // products, shipping_addresses, coupons
    sub_resources: 3,
    exclude_paths: &[
        &["credit_card_type"],
        &["products", "configurable_fields"],
        &["products", "fulfillment_source"],
        &["shipping_addresses", "shipping_quotes"],
    ],
    date_fields: &["date_modified", "date_created", "date_shipped"],
};

pub const CUSTOMERS: Endpoint = Endpoint {
    name: "customers",
    version: ApiVersion::V2,
    path: "customers",
    sub_resources: 0,
    exclude_paths: &[&["addresses"]],
    date_fields: &["date_modified", "date_created"],
};

pub const PRODUCTS: Endpoint = Endpoint {
    name: "products",
    version: ApiVersion::V3,
    path: "catalog/products",
    sub_resources: 0,
    exclude_paths: &[],
    date_fields: &[],
};

pub const COUPONS: Endpoint = Endpoint {
    name: "coupons",
    version: ApiVersion::V2,
    path: "coupons",
    sub_resources: 0,
    exclude_paths: &[],
    date_fields: &["date_created", "expires"],
};

/// Cheap v2 resource used to authorize and calibrate the rate limit
pub const TIME: Endpoint = Endpoint {
    name: "time",
    version: ApiVersion::V2,
    path: "time",
    sub_resources: 0,
    exclude_paths: &[],
    date_fields: &[],
};

/// Every paginated resource
pub const ENDPOINTS: [&Endpoint; 4] = [&ORDERS, &CUSTOMERS, &PRODUCTS, &COUPONS];

/// Look up a resource by name
pub fn endpoint(name: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().copied().find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(endpoint("orders"), Some(&ORDERS));
        assert_eq!(endpoint("products").unwrap().version, ApiVersion::V3);
        assert!(endpoint("time").is_none());
        assert!(endpoint("refunds").is_none());
    }

    #[test]
    fn test_orders_descriptor() {
        assert_eq!(ORDERS.sub_resources, 3);
        let excluded = ORDERS.excluded_paths();
        assert_eq!(excluded.len(), 4);
        assert!(excluded.contains(&["products".to_string(), "configurable_fields".to_string()]));
        assert!(!excluded.contains(&["configurable_fields".to_string()]));
    }

    #[test]
    fn test_only_orders_carry_sub_resources() {
        for e in ENDPOINTS {
            if e.name != "orders" {
                assert_eq!(e.sub_resources, 0, "{}", e.name);
            }
        }
    }
}
