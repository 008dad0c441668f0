//! Tests for pagination module

use super::*;
use crate::config::TapConfig;
use crate::endpoints::{Endpoint, COUPONS, ORDERS, PRODUCTS};
use crate::error::Error;
use crate::http::{
    HttpSession, SubResourcePool, HEADER_REQUESTS_LEFT, HEADER_REQUESTS_QUOTA,
    HEADER_TIME_RESET_MS, HEADER_TIME_WINDOW_MS,
};
use crate::types::{ApiVersion, Record, RecordStream, UnknownQuotaPolicy};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COUPONS_PATH: &str = "/stores/store123/v2/coupons";
const ORDERS_PATH: &str = "/stores/store123/v2/orders";

fn test_config(server: &MockServer) -> TapConfig {
    TapConfig::new("store123", "client", "token", "2019-01-01T00:00:00Z")
        .with_base_url(format!("{}/stores", server.uri()))
        .with_row_error_delay_ms(10)
}

fn rows(first_id: usize, count: usize) -> Value {
    Value::Array(
        (first_id..first_id + count)
            .map(|id| json!({"id": id, "code": format!("C{id}")}))
            .collect(),
    )
}

fn link(server: &MockServer, sub_path: &str) -> Value {
    json!({
        "url": format!("{}{ORDERS_PATH}/{sub_path}", server.uri()),
        "resource": format!("/orders/{sub_path}")
    })
}

fn paginator(
    session: &Arc<HttpSession>,
    config: &TapConfig,
    endpoint: &'static Endpoint,
    sleeper: &RecordingSleeper,
) -> ResourcePaginator {
    let pool = SubResourcePool::new(session.clone(), config.max_concurrent_requests);
    ResourcePaginator::new(
        session.clone(),
        Arc::new(pool),
        endpoint,
        PaginatorSettings::from(config),
    )
    .with_sleeper(Arc::new(sleeper.clone()))
}

/// Drain a stream, returning the records and the error that ended it
async fn drain(mut stream: RecordStream) -> (Vec<Record>, Option<Error>) {
    let mut records = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => records.push(record),
            Err(e) => return (records, Some(e)),
        }
    }
    (records, None)
}

async fn mount_page(server: &MockServer, route: &str, page: u32, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Body Decoding Tests
// ============================================================================

#[test]
fn test_decode_rows() {
    assert_eq!(
        decode_rows(ApiVersion::V2, json!([{"id": 1}])).unwrap(),
        vec![json!({"id": 1})]
    );
    assert_eq!(
        decode_rows(ApiVersion::V3, json!({"data": [{"id": 2}], "meta": {}})).unwrap(),
        vec![json!({"id": 2})]
    );
    assert!(decode_rows(ApiVersion::V2, Value::Null).unwrap().is_empty());
    assert!(decode_rows(ApiVersion::V3, json!([])).unwrap().is_empty());
    assert!(decode_rows(ApiVersion::V3, json!({"meta": {}})).unwrap().is_empty());
}

#[test]
fn test_decode_rows_rejects_unexpected_shapes() {
    assert!(matches!(
        decode_rows(ApiVersion::V2, json!({"data": []})),
        Err(Error::Decode { .. })
    ));
    assert!(matches!(
        decode_rows(ApiVersion::V3, json!({"data": {"id": 1}})),
        Err(Error::Decode { .. })
    ));
    assert!(matches!(
        decode_rows(ApiVersion::V3, json!([{"id": 1}])),
        Err(Error::Decode { .. })
    ));
}

#[test]
fn test_page_state_names() {
    assert_eq!(PageState::Fetching { page: 1 }.name(), "fetching");
    assert_eq!(PageState::Done.name(), "done");
}

// ============================================================================
// Page Loop Tests
// ============================================================================

#[tokio::test]
async fn test_pages_until_short_page() {
    let server = MockServer::start().await;
    mount_page(&server, COUPONS_PATH, 1, rows(1, 50)).await;
    mount_page(&server, COUPONS_PATH, 2, rows(51, 50)).await;
    mount_page(&server, COUPONS_PATH, 3, rows(101, 23)).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 123);
    assert_eq!(records[0]["id"], 1);
    assert_eq!(records[122]["id"], 123);
    assert_eq!(session.request_count(), 3);
    assert!(sleeper.calls().is_empty());
}

#[tokio::test]
async fn test_exact_multiple_ends_on_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, COUPONS_PATH, 1, rows(1, 50)).await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 50);
    assert_eq!(session.request_count(), 2);
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let server = MockServer::start().await;
    mount_page(&server, COUPONS_PATH, 1, rows(1, 2)).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let mut stream = paginator(&session, &config, &COUPONS, &sleeper).into_stream();
    assert_eq!(session.request_count(), 0);

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(session.request_count(), 1);
}

#[tokio::test]
async fn test_filter_params_sent_with_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("min_date_modified", "2019-01-01T00:00:00+00:00"))
        .and(query_param("sort", "date_modified:asc"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let stream = paginator(&session, &config, &ORDERS, &sleeper)
        .with_param("min_date_modified", "2019-01-01T00:00:00+00:00")
        .with_param("sort", "date_modified:asc")
        .into_stream();
    let (records, err) = drain(stream).await;

    assert!(err.is_none());
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_v3_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stores/store123/v3/catalog/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 77, "name": "Widget"}, {"id": 78, "name": "Gadget"}],
            "meta": {"pagination": {"total": 2}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &PRODUCTS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    let names: Vec<_> = records.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("Widget"), json!("Gadget")]);
}

#[tokio::test]
async fn test_transport_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(records.is_empty());
    assert!(matches!(err, Some(Error::HttpStatus { status: 500, .. })));
    assert!(sleeper.calls().is_empty());
}

// ============================================================================
// Rate Limit Tests
// ============================================================================

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    mount_page(&server, COUPONS_PATH, 1, rows(1, 50)).await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(429).insert_header(HEADER_TIME_WINDOW_MS, "5000"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, COUPONS_PATH, 2, rows(51, 50)).await;
    mount_page(&server, COUPONS_PATH, 3, rows(101, 23)).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 123);
    let ids: HashSet<_> = records.iter().map(|r| r["id"].to_string()).collect();
    assert_eq!(ids.len(), 123);
    assert_eq!(session.request_count(), 4);
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(6)]);
}

#[tokio::test]
async fn test_max_fetch_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.max_fetch_retries = 2;
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(records.is_empty());
    assert!(matches!(err, Some(Error::MaxRetriesExceeded { max_retries: 2 })));
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(31); 2]);
}

#[tokio::test]
async fn test_throttled_page_waits_for_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(HEADER_REQUESTS_LEFT, "10")
                .insert_header(HEADER_TIME_RESET_MS, "1500")
                .set_body_json(rows(1, 10)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 10);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(1500)]);
}

#[tokio::test]
async fn test_short_page_within_budget_is_not_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(COUPONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(HEADER_REQUESTS_LEFT, "10")
                .insert_header(HEADER_TIME_RESET_MS, "1500")
                .set_body_json(rows(1, 3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 3);
    assert!(sleeper.calls().is_empty());
}

#[tokio::test]
async fn test_page_size_clamped_by_calibrated_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stores/store123/v2/time"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(HEADER_REQUESTS_QUOTA, "150")
                .insert_header(HEADER_REQUESTS_LEFT, "149")
                .insert_header(HEADER_TIME_WINDOW_MS, "30000")
                .insert_header(HEADER_TIME_RESET_MS, "30000")
                .set_body_json(json!({"time": 1})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("limit", "45"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server).with_unknown_quota(UnknownQuotaPolicy::Fail);
    let session = Arc::new(HttpSession::connect(&config).await.unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &ORDERS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert!(records.is_empty());
    assert_eq!(session.governor().page_size(), 45);
}

#[tokio::test]
async fn test_unknown_quota_fail_policy() {
    let server = MockServer::start().await;
    let config = test_config(&server).with_unknown_quota(UnknownQuotaPolicy::Fail);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (_, err) = drain(paginator(&session, &config, &ORDERS, &sleeper).into_stream()).await;

    assert!(matches!(err, Some(Error::UnknownQuota { .. })));
    assert_eq!(session.request_count(), 0);
}

// ============================================================================
// Sub-Resource Tests
// ============================================================================

#[tokio::test]
async fn test_orders_resolve_filter_and_normalize() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        ORDERS_PATH,
        1,
        json!([{
            "id": 1,
            "credit_card_type": "visa",
            "date_created": "Mon, 31 Dec 2018 23:59:35 +0000",
            "date_shipped": "",
            "products": link(&server, "1/products"),
            "shipping_addresses": link(&server, "1/shippingaddresses"),
            "coupons": link(&server, "1/coupons")
        }]),
    )
    .await;
    mount_page_any(
        &server,
        "1/products",
        json!([{"id": 10, "sku": "A", "configurable_fields": [], "fulfillment_source": "x"}]),
    )
    .await;
    mount_page_any(
        &server,
        "1/shippingaddresses",
        json!([{"id": 20, "city": "Austin", "shipping_quotes": {"resource": "q", "url": "x"}}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{ORDERS_PATH}/1/coupons")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &ORDERS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(
        Value::Object(records[0].clone()),
        json!({
            "id": 1,
            "date_created": "2018-12-31T23:59:35.000000Z",
            "date_shipped": "",
            "products": [{"id": 10, "sku": "A"}],
            "shipping_addresses": [{"id": 20, "city": "Austin"}],
            "coupons": []
        })
    );
    assert_eq!(session.request_count(), 4);
}

async fn mount_page_any(server: &MockServer, sub_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("{ORDERS_PATH}/{sub_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rate_limit_during_resolution_refetches_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "products": link(&server, "1/products")},
            {"id": 2, "products": link(&server, "2/products")}
        ])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{ORDERS_PATH}/1/products")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"sku": "A"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{ORDERS_PATH}/2/products")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page_any(&server, "2/products", json!([{"sku": "B"}])).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &ORDERS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["products"], json!([{"sku": "A"}]));
    assert_eq!(records[1]["products"], json!([{"sku": "B"}]));
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(31)]);
}

// ============================================================================
// Row Error Tests
// ============================================================================

#[tokio::test]
async fn test_row_errors_within_threshold_are_skipped() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        COUPONS_PATH,
        1,
        json!([{"id": 1}, 1, 2, 3, {"id": 2}, "x", {"id": 3}]),
    )
    .await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(10); 4]);
}

#[tokio::test]
async fn test_row_errors_beyond_threshold_are_fatal() {
    let server = MockServer::start().await;
    mount_page(&server, COUPONS_PATH, 1, json!([{"id": 1}, 1, 2, 3, 4, {"id": 2}])).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &COUPONS, &sleeper).into_stream()).await;

    assert_eq!(records.len(), 1);
    assert!(matches!(
        err,
        Some(Error::RowProcessing { page: 1, errors: 4, .. })
    ));
    assert_eq!(sleeper.calls().len(), 3);
}

#[tokio::test]
async fn test_failed_sub_resource_skips_only_its_row() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        ORDERS_PATH,
        1,
        json!([
            {"id": 1, "products": link(&server, "1/products")},
            {"id": 2, "products": link(&server, "2/products")}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{ORDERS_PATH}/1/products")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page_any(&server, "2/products", json!([{"sku": "B"}])).await;

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let sleeper = RecordingSleeper::new();

    let (records, err) = drain(paginator(&session, &config, &ORDERS, &sleeper).into_stream()).await;

    assert!(err.is_none());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 2);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(10)]);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_dropping_stream_mid_page_releases_pool() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        ORDERS_PATH,
        1,
        json!([
            {"id": 1, "products": link(&server, "1/products"), "coupons": link(&server, "1/coupons")},
            {"id": 2, "products": link(&server, "2/products"), "coupons": link(&server, "2/coupons")}
        ]),
    )
    .await;
    for sub_path in ["1/products", "1/coupons", "2/products", "2/coupons"] {
        Mock::given(method("GET"))
            .and(path(format!("{ORDERS_PATH}/{sub_path}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
    }

    let config = test_config(&server);
    let session = Arc::new(HttpSession::new(&config).unwrap());
    let pool = SubResourcePool::new(session.clone(), config.max_concurrent_requests);
    let mut stream = ResourcePaginator::new(
        session.clone(),
        Arc::new(pool.clone()),
        &ORDERS,
        PaginatorSettings::from(&config),
    )
    .with_sleeper(Arc::new(RecordingSleeper::new()))
    .into_stream();

    let first = tokio::time::timeout(Duration::from_millis(300), stream.next()).await;
    assert!(first.is_err(), "page should still be resolving");
    assert_eq!(pool.available(), pool.size() - 4);

    drop(stream);
    for _ in 0..100 {
        if pool.available() == pool.size() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.available(), pool.size());
}
