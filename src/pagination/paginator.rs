//! Page-number paginator over one endpoint
//!
//! Each page goes through fetch, resolve, emit. Sub-resources for every row
//! are dispatched before any is awaited, and no record of a page is emitted
//! until the whole page has resolved, so a 429 during resolution can refetch
//! the page without duplicating output.

use super::types::{PageState, PaginatorSettings, Sleeper, TokioSleeper};
use crate::endpoints::Endpoint;
use crate::error::{Error, Result};
use crate::http::{requests_needed, HttpSession};
use crate::resolve::{NestedResourceResolver, ResourceFetcher, ResourceNode};
use crate::transform::{filter_excluded_paths, normalize_dates, ExcludedPaths};
use crate::types::{ApiVersion, Record, RecordStream};
use async_stream::try_stream;
use futures::Stream;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lazily pages through one endpoint, yielding finished records
pub struct ResourcePaginator {
    session: Arc<HttpSession>,
    resolver: NestedResourceResolver,
    endpoint: &'static Endpoint,
    excluded: ExcludedPaths,
    params: Vec<(String, String)>,
    settings: PaginatorSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl ResourcePaginator {
    /// Paginator fetching sub-resources through `fetcher`
    pub fn new(
        session: Arc<HttpSession>,
        fetcher: Arc<dyn ResourceFetcher>,
        endpoint: &'static Endpoint,
        settings: PaginatorSettings,
    ) -> Self {
        let excluded = endpoint.excluded_paths();
        Self {
            session,
            resolver: NestedResourceResolver::new(fetcher, excluded.clone()),
            endpoint,
            excluded,
            params: Vec::new(),
            settings,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Add a filter parameter sent with every page
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Replace the filter parameters
    #[must_use]
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Start paginating; nothing is requested until the stream is polled
    pub fn into_stream(self) -> RecordStream {
        Box::pin(self.records())
    }

    fn records(self) -> impl Stream<Item = Result<Record>> + Send {
        try_stream! {
            let url = self.session.endpoint_url(self.endpoint)?;
            let page_size = self.session.governor().page_size_for(
                self.endpoint,
                self.settings.sub_resource_margin,
                self.settings.unknown_quota,
            )?;
            info!(resource = self.endpoint.name, page_size, "starting pagination");

            let mut retries = 0u32;
            let mut emitted = 0usize;
            let mut state = PageState::Fetching { page: 1 };

            loop {
                debug!(resource = self.endpoint.name, state = state.name());
                state = match state {
                    PageState::Fetching { page } => {
                        let fetched = self.fetch_page(url.as_str(), page, page_size).await;
                        self.after_fetch(page, fetched)?
                    }
                    PageState::RateLimited { page } => {
                        retries += 1;
                        let delay = self.retry_delay(page, retries)?;
                        self.sleeper.sleep(delay).await;
                        PageState::Fetching { page }
                    }
                    PageState::Throttled { page, rows } => {
                        let pause = self.session.governor().pause_duration();
                        warn!(
                            resource = self.endpoint.name,
                            page,
                            "not enough requests left for this page, waiting {:.2}s",
                            pause.as_secs_f64()
                        );
                        self.sleeper.sleep(pause).await;
                        PageState::Resolving { page, rows }
                    }
                    PageState::Resolving { page, rows } => {
                        let fetched = rows.len();
                        let resolved = self.resolve_page(rows).await;
                        self.after_resolve(page, fetched, resolved)?
                    }
                    PageState::Emitting { page, fetched, rows } => {
                        retries = 0;
                        let mut consecutive = 0u32;
                        for row in rows {
                            match row.and_then(|value| self.to_record(value)) {
                                Ok(record) => {
                                    consecutive = 0;
                                    emitted += 1;
                                    yield record;
                                }
                                Err(err) => {
                                    consecutive += 1;
                                    self.tolerate_row_error(page, consecutive, err)?;
                                    self.sleeper.sleep(self.settings.row_error_delay).await;
                                }
                            }
                        }
                        debug!(resource = self.endpoint.name, page, fetched, "page emitted");
                        if fetched < page_size as usize {
                            PageState::Done
                        } else {
                            PageState::Fetching { page: page + 1 }
                        }
                    }
                    PageState::Done => break,
                };
            }

            info!(resource = self.endpoint.name, records = emitted, "pagination complete");
        }
    }

    async fn fetch_page(&self, url: &str, page: u32, limit: u32) -> Result<Vec<Value>> {
        let mut query = self.params.clone();
        query.push(("page".to_string(), page.to_string()));
        query.push(("limit".to_string(), limit.to_string()));

        let body = self.session.get_json(url, &query).await?;
        decode_rows(self.endpoint.version, body)
    }

    /// Pause when the rows just fetched need more requests than are left
    fn after_fetch(&self, page: u32, fetched: Result<Vec<Value>>) -> Result<PageState> {
        match fetched {
            Ok(rows) => {
                debug!(resource = self.endpoint.name, page, rows = rows.len(), "page fetched");
                let needed = requests_needed(rows.len() as u32, self.endpoint.sub_resources);
                if self.session.governor().should_pause(needed) {
                    Ok(PageState::Throttled { page, rows })
                } else {
                    Ok(PageState::Resolving { page, rows })
                }
            }
            Err(e) if e.is_rate_limited() => Ok(PageState::RateLimited { page }),
            Err(e) => Err(e),
        }
    }

    /// Dispatch every row, then await them in order
    ///
    /// A 429 on any sub-resource abandons the page: the remaining nodes are
    /// dropped, which aborts their fetches. Other failures stay with their row.
    async fn resolve_page(&self, rows: Vec<Value>) -> Result<Vec<Result<Value>>> {
        let nodes: Vec<ResourceNode> = rows
            .into_iter()
            .map(|row| self.resolver.dispatch(row))
            .collect();
        debug!(
            resource = self.endpoint.name,
            pending = nodes.iter().map(ResourceNode::pending_count).sum::<usize>(),
            "sub-resources dispatched"
        );

        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.resolve().await {
                Err(e) if e.is_rate_limited() => return Err(e),
                other => resolved.push(other),
            }
        }
        Ok(resolved)
    }

    fn after_resolve(
        &self,
        page: u32,
        fetched: usize,
        resolved: Result<Vec<Result<Value>>>,
    ) -> Result<PageState> {
        match resolved {
            Ok(rows) => Ok(PageState::Emitting { page, fetched, rows }),
            Err(e) if e.is_rate_limited() => Ok(PageState::RateLimited { page }),
            Err(e) => Err(e),
        }
    }

    fn retry_delay(&self, page: u32, attempt: u32) -> Result<Duration> {
        if attempt > self.settings.max_fetch_retries {
            return Err(Error::MaxRetriesExceeded {
                max_retries: self.settings.max_fetch_retries,
            });
        }
        let delay = self.session.governor().retry_delay();
        error!(
            resource = self.endpoint.name,
            page,
            attempt,
            "rate limit exceeded, retrying page in {:.2}s",
            delay.as_secs_f64()
        );
        Ok(delay)
    }

    fn tolerate_row_error(&self, page: u32, consecutive: u32, err: Error) -> Result<()> {
        if consecutive > self.settings.max_row_errors {
            return Err(Error::RowProcessing {
                page,
                errors: consecutive,
                message: err.to_string(),
            });
        }
        warn!(
            resource = self.endpoint.name,
            page,
            consecutive,
            error = %err,
            "skipping row"
        );
        Ok(())
    }

    fn to_record(&self, row: Value) -> Result<Record> {
        let filtered = filter_excluded_paths(&row, &self.excluded);
        match normalize_dates(&filtered, self.endpoint.date_fields) {
            Value::Object(record) => Ok(record),
            other => Err(Error::decode(format!(
                "expected an object row, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl std::fmt::Debug for ResourcePaginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePaginator")
            .field("endpoint", &self.endpoint.name)
            .field("params", &self.params)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Extract the rows of one page body
///
/// v2 answers with a bare list; v3 wraps it in `{"data": [...]}`. An empty
/// body (`null`) or a `204` has no rows.
pub fn decode_rows(version: ApiVersion, body: Value) -> Result<Vec<Value>> {
    match (version, body) {
        (_, Value::Null) => Ok(Vec::new()),
        (_, Value::Array(rows)) if rows.is_empty() => Ok(rows),
        (ApiVersion::V2, Value::Array(rows)) => Ok(rows),
        (ApiVersion::V3, Value::Object(mut envelope)) => match envelope.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(Error::decode(format!(
                "v3 'data' is {}, expected a list",
                json_kind(&other)
            ))),
        },
        (version, other) => Err(Error::decode(format!(
            "unexpected {version} page body: {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
