//! Authenticated GET / POST / paginated GET
//!
//! URLs are `api_base_url + path`. Every request carries
//! `Authorization: Bearer <token>` from the token source, fetched fresh per
//! request so a refresh between pages is picked up. Error bodies are returned
//! verbatim; retry policy belongs to the caller.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::source::AccessTokenSource;

/// Cursor parameter sent to request the next page
const PAGE_START_ID: &str = "page_start_id";

/// Page size parameter
const PAGE_LIMIT: &str = "page_limit";

/// Client for the Hubstaff REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET `path` with `query` encoded as the query string.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        self.execute(Method::GET, path, query, None).await
    }

    /// POST `body` as JSON to `path`.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(Method::POST, path, &[], Some(body)).await
    }

    /// Walk a paginated collection, calling `on_page` once per page.
    ///
    /// The cursor comes from `pagination.next_page_start_id` of the previous
    /// page and is sent as `page_start_id`. Iteration stops after a page that
    /// is `null`, a page without a `pagination` block, or once `max_requests`
    /// requests have been made. `page_limit` is forwarded on every request when
    /// set and omitted entirely otherwise.
    pub async fn get_paged<F>(
        &self,
        path: &str,
        query: &[(String, String)],
        page_limit: Option<u32>,
        max_requests: Option<usize>,
        mut on_page: F,
    ) -> Result<()>
    where
        F: FnMut(Value),
    {
        let mut query = query.to_vec();
        if let Some(limit) = page_limit {
            query.retain(|(k, _)| k != PAGE_LIMIT);
            query.push((PAGE_LIMIT.to_string(), limit.to_string()));
        }

        let mut requests = 0usize;
        loop {
            let page = self.get(path, &query).await?;
            requests += 1;

            if page.is_null() {
                debug!(path, requests, "empty page, stopping");
                break;
            }

            let has_pagination = page.get("pagination").is_some();
            let next = next_page_start_id(&page);

            on_page(page);

            if !has_pagination {
                break;
            }
            if max_requests.is_some_and(|max| requests >= max) {
                debug!(path, requests, "request limit reached, stopping");
                break;
            }
            let Some(cursor) = next else {
                debug!(path, requests, "pagination without next_page_start_id, stopping");
                break;
            };

            query.retain(|(k, _)| k != PAGE_START_ID);
            query.push((PAGE_START_ID.to_string(), cursor));
        }

        Ok(())
    }

    #[instrument(skip_all, fields(request_id, method = %method, path = %path))]
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        tracing::Span::current().record("request_id", request_id.as_str());

        let token = self.tokens.access_token().await?;

        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{method} {path} failed: {e}")))?;

        let status = response.status();
        record_request(method.as_str(), status.as_u16());

        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "API returned error status");
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// The cursor for the next page, as a query string value.
fn next_page_start_id(page: &Value) -> Option<String> {
    match page.get("pagination")?.get("next_page_start_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Record a completed API request with method and status labels.
fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "hubstaff_api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
