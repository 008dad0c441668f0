//! BigCommerce replication client
//!
//! Knows the query rules of each resource and hands back lazy record
//! streams. All streams share one session, so one rate limit budget and one
//! sub-resource pool.

use super::windows::day_windows;
use crate::config::TapConfig;
use crate::endpoints::{Endpoint, COUPONS, CUSTOMERS, ORDERS, PRODUCTS};
use crate::error::{Error, Result};
use crate::http::{HttpSession, SubResourcePool};
use crate::pagination::{PaginatorSettings, ResourcePaginator, Sleeper, TokioSleeper};
use crate::types::{Record, RecordStream};
use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Client for one store
#[derive(Clone)]
pub struct BigCommerceClient {
    config: Arc<TapConfig>,
    session: Arc<HttpSession>,
    pool: SubResourcePool,
    sleeper: Arc<dyn Sleeper>,
    now: DateTime<Utc>,
}

impl BigCommerceClient {
    /// Authorize against the store and calibrate the rate limit
    pub async fn connect(config: TapConfig) -> Result<Self> {
        let session = HttpSession::connect(&config).await?;
        Ok(Self::from_session(config, Arc::new(session)))
    }

    /// Client over an existing session, without a calibration request
    pub fn from_session(config: TapConfig, session: Arc<HttpSession>) -> Self {
        let pool = SubResourcePool::new(Arc::clone(&session), config.max_concurrent_requests);
        Self {
            config: Arc::new(config),
            session,
            pool,
            sleeper: Arc::new(TokioSleeper),
            now: Utc::now(),
        }
    }

    /// Fix the end of the customers window range
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the session with a freshly authorized one
    ///
    /// The page size reached so far carries over to the new session.
    pub async fn reauthorize(&mut self) -> Result<()> {
        let page_size = self.session.governor().page_size();
        let session = Arc::new(HttpSession::connect(&self.config).await?);
        session.governor().clamp_page_size(page_size);

        self.pool = SubResourcePool::new(Arc::clone(&session), self.config.max_concurrent_requests);
        self.session = session;
        info!("re-authorized BigCommerce session");
        Ok(())
    }

    pub fn session(&self) -> &Arc<HttpSession> {
        &self.session
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Paginate `endpoint` with the given filter parameters
    pub fn resource(
        &self,
        endpoint: &'static Endpoint,
        params: Vec<(String, String)>,
    ) -> RecordStream {
        let fetcher = Arc::new(self.pool.clone());
        ResourcePaginator::new(
            Arc::clone(&self.session),
            fetcher,
            endpoint,
            PaginatorSettings::from(self.config.as_ref()),
        )
        .with_params(params)
        .with_sleeper(Arc::clone(&self.sleeper))
        .into_stream()
    }

    /// Orders modified at or after `since`, oldest first
    pub fn orders(&self, since: DateTime<Utc>) -> RecordStream {
        self.resource(
            &ORDERS,
            vec![
                ("min_date_modified".to_string(), super::iso(since)),
                ("sort".to_string(), "date_modified:asc".to_string()),
            ],
        )
    }

    /// Products modified at or after `since`, oldest first
    pub fn products(&self, since: DateTime<Utc>) -> RecordStream {
        self.resource(
            &PRODUCTS,
            vec![
                ("date_modified:min".to_string(), super::iso(since)),
                ("sort".to_string(), "date_modified".to_string()),
                ("direction".to_string(), "asc".to_string()),
            ],
        )
    }

    /// Customers modified since `since`, one day window at a time
    pub fn customers(&self, since: DateTime<Utc>) -> RecordStream {
        Box::pin(self.clone().customer_windows(since))
    }

    fn customer_windows(self, since: DateTime<Utc>) -> impl Stream<Item = Result<Record>> + Send {
        try_stream! {
            for window in day_windows(since, self.now) {
                debug!(start = %window.start, end = %window.end, "customers window");
                let mut records = self.resource(&CUSTOMERS, window.query());
                while let Some(record) = records.next().await {
                    yield record?;
                }
            }
        }
    }

    /// Every coupon
    pub fn coupons(&self) -> RecordStream {
        self.resource(&COUPONS, Vec::new())
    }

    /// Stream of the named resource
    ///
    /// Incremental resources start at `bookmark`, or the configured start
    /// date when there is none.
    pub fn records(&self, name: &str, bookmark: Option<DateTime<Utc>>) -> Result<RecordStream> {
        let since = match bookmark {
            Some(since) => since,
            None => self.config.start_date()?,
        };

        match name {
            "orders" => Ok(self.orders(since)),
            "products" => Ok(self.products(since)),
            "customers" => Ok(self.customers(since)),
            "coupons" => Ok(self.coupons()),
            _ => Err(Error::StreamNotFound {
                stream: name.to_string(),
            }),
        }
    }

    /// The named resource as consecutive slices, in read order
    ///
    /// When a slice is drained, every row it covers has been returned.
    /// Customers are one slice per day window, other resources a single one.
    pub fn record_windows(
        &self,
        name: &str,
        bookmark: Option<DateTime<Utc>>,
    ) -> Result<Vec<RecordStream>> {
        if name != "customers" {
            return Ok(vec![self.records(name, bookmark)?]);
        }

        let since = match bookmark {
            Some(since) => since,
            None => self.config.start_date()?,
        };
        Ok(day_windows(since, self.now)
            .into_iter()
            .map(|window| self.resource(&CUSTOMERS, window.query()))
            .collect())
    }
}

impl std::fmt::Debug for BigCommerceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigCommerceClient")
            .field("session", &self.session)
            .field("pool_size", &self.pool.size())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
