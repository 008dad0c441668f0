//! Authenticated BigCommerce session
//!
//! One session holds the reqwest client, the store credentials and the rate
//! limit governor. Every response is handed to the registered observers
//! before its status is mapped, so the governor sees 429s and sub-resource
//! responses too.

use super::pacer::RequestPacer;
use super::rate_limit::{RateLimitGovernor, RateLimitState};
use crate::config::TapConfig;
use crate::endpoints::{Endpoint, TIME};
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const AUTH_CLIENT_HEADER: &str = "x-auth-client";
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Hook invoked with the status and headers of every response
pub trait ResponseObserver: Send + Sync {
    fn on_response(&self, status: StatusCode, headers: &HeaderMap);
}

impl ResponseObserver for RateLimitGovernor {
    fn on_response(&self, _status: StatusCode, headers: &HeaderMap) {
        self.observe(headers);
    }
}

/// Authenticated client bound to one store
pub struct HttpSession {
    client: Client,
    /// `{base_url}/{store_hash}/`
    store_url: Url,
    headers: HeaderMap,
    governor: Arc<RateLimitGovernor>,
    observers: Vec<Arc<dyn ResponseObserver>>,
    pacer: Option<RequestPacer>,
    request_count: AtomicU64,
}

impl HttpSession {
    /// Build a session without contacting the API
    pub fn new(config: &TapConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("bigcommerce-tap/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store_url = Url::parse(&format!(
            "{}/{}/",
            config.base_url.trim_end_matches('/'),
            config.store_hash
        ))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(AUTH_CLIENT_HEADER),
            header_value("client_id", &config.client_id)?,
        );
        headers.insert(
            HeaderName::from_static(AUTH_TOKEN_HEADER),
            header_value("access_token", &config.access_token)?,
        );

        let governor = Arc::new(RateLimitGovernor::new(config.page_size));
        let observer: Arc<dyn ResponseObserver> = governor.clone();

        Ok(Self {
            client,
            store_url,
            headers,
            governor,
            observers: vec![observer],
            pacer: config.max_requests_per_second.map(RequestPacer::new),
            request_count: AtomicU64::new(0),
        })
    }

    /// Build a session and authorize it against the `time` resource
    pub async fn connect(config: &TapConfig) -> Result<Self> {
        let session = Self::new(config)?;
        session.calibrate().await?;
        Ok(session)
    }

    /// Register an additional response observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Issue the calibration request
    ///
    /// Any failure is reported as an authorization error. On success the
    /// governor holds the store's quota.
    pub async fn calibrate(&self) -> Result<RateLimitState> {
        let url = self.endpoint_url(&TIME)?;
        match self.get_json(url.as_str(), &[]).await {
            Ok(_) => {
                let state = self.governor.snapshot();
                info!(
                    quota = ?state.requests_quota,
                    window_ms = ?state.window_size_ms,
                    "authorized against BigCommerce API"
                );
                Ok(state)
            }
            Err(e) => Err(Error::authorization(e.to_string())),
        }
    }

    /// URL of an endpoint for this store
    pub fn endpoint_url(&self, endpoint: &Endpoint) -> Result<Url> {
        Ok(self
            .store_url
            .join(&format!("{}/{}", endpoint.version.segment(), endpoint.path))?)
    }

    /// GET a URL and decode its JSON body
    ///
    /// `200` decodes the body (an empty body is `null`), `204` is an empty
    /// array, `429` is [`Error::RateLimited`], everything else is
    /// [`Error::HttpStatus`].
    pub async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value> {
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .query(query)
            .send()
            .await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let status = response.status();
        for observer in &self.observers {
            observer.on_response(status, response.headers());
        }

        match status {
            StatusCode::OK => {
                let body = response.text().await?;
                debug!(url, bytes = body.len(), "request succeeded");
                if body.trim().is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(serde_json::from_str(&body)?)
                }
            }
            StatusCode::NO_CONTENT => Ok(Value::Array(Vec::new())),
            StatusCode::TOO_MANY_REQUESTS => {
                let window_ms = RateLimitState::from_headers(response.headers()).window_size_ms;
                warn!(url, ?window_ms, "rate limited (429)");
                Err(Error::RateLimited { window_ms })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::http_status(status.as_u16(), body))
            }
        }
    }

    /// Rate limit governor fed by this session
    pub fn governor(&self) -> &Arc<RateLimitGovernor> {
        &self.governor
    }

    /// Requests sent so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("store_url", &self.store_url.as_str())
            .field("observers", &self.observers.len())
            .field("pacer", &self.pacer)
            .field("request_count", &self.request_count())
            .finish_non_exhaustive()
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::invalid_value(field, "not a valid HTTP header value"))
}
