//! PostgREST-style durable store over HTTP.
//!
//! Translates a [`Query`] into a request against `/rest/v1/{table}`:
//!
//! | Action | Method | Notes |
//! |--------|--------|-------|
//! | Select | `GET` | filters, `order`, `limit` as query parameters |
//! | Insert | `POST` | `Prefer: return=representation` |
//! | Upsert | `POST` | `on_conflict` plus `Prefer: resolution=merge-duplicates` |
//! | Update | `PATCH` | filters select the rows |
//! | Delete | `DELETE` | filters select the rows |
//!
//! Filters are rendered as `column=op.value`.

use crate::core::{DurableStore, Query, QueryAction, Rows, StoreError, StoreResult};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

const BACKEND: &str = "rest";

/// Configuration for [`RestStore`].
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Base URL of the service, without the `/rest/v1` suffix.
    pub base_url: String,

    /// API key (kept secret). Sent as `apikey` and as a bearer token.
    pub api_key: SecretString,

    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
}

impl RestStoreConfig {
    /// Creates a configuration for the given service URL and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::new(api_key.into().into()),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP-backed [`DurableStore`].
///
/// # Example
///
/// ```rust,ignore
/// use tierguard::backends::rest::{RestStore, RestStoreConfig};
///
/// let store = RestStore::new(RestStoreConfig::new("https://db.example.com", "service-key"))?;
/// ```
#[derive(Debug)]
pub struct RestStore {
    config: RestStoreConfig,
    client: reqwest::Client,
}

impl RestStore {
    /// Creates a new store. Fails if the key is empty or the client cannot be built.
    pub fn new(config: RestStoreConfig) -> StoreResult<Self> {
        if config.base_url.is_empty() {
            return Err(StoreError::configuration("REST base URL is empty"));
        }
        if config.api_key.expose_secret().is_empty() {
            return Err(StoreError::unavailable(BACKEND, "no API key configured"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let key = self.config.api_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {}", key))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> StoreResult<reqwest::Response> {
        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }

    fn map_transport(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::timeout(BACKEND, self.config.timeout)
        } else if err.is_connect() {
            StoreError::unavailable(BACKEND, err.to_string())
        } else {
            StoreError::failed(BACKEND, err.to_string())
        }
    }
}

#[async_trait]
impl DurableStore for RestStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn execute(&self, query: &Query) -> StoreResult<Rows> {
        let url = self.table_url(&query.table);
        let params = query_params(query);

        let builder = match &query.action {
            QueryAction::Select => self.request(Method::GET, &url),
            QueryAction::Insert => self
                .request(Method::POST, &url)
                .header("Prefer", "return=representation")
                .json(&required_payload(query)?),
            QueryAction::Upsert { .. } => self
                .request(Method::POST, &url)
                .header("Prefer", "resolution=merge-duplicates,return=representation")
                .json(&required_payload(query)?),
            QueryAction::Update => self
                .request(Method::PATCH, &url)
                .header("Prefer", "return=representation")
                .json(&required_payload(query)?),
            QueryAction::Delete => self
                .request(Method::DELETE, &url)
                .header("Prefer", "return=representation"),
        };

        let response = self.send(builder.query(&params)).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(match body {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }

    async fn probe(&self) -> StoreResult<()> {
        let url = format!("{}/rest/v1/", self.config.base_url);
        self.send(self.request(Method::HEAD, &url)).await.map(|_| ())
    }
}

fn required_payload(query: &Query) -> StoreResult<&Value> {
    query
        .payload
        .as_ref()
        .ok_or_else(|| StoreError::rejected(BACKEND, format!("{} requires a payload", query.action)))
}

/// Renders the query-string parameters for a query.
fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|f| (f.column.clone(), format!("{}.{}", f.op.as_str(), render_value(&f.value))))
        .collect();

    if let QueryAction::Upsert { on_conflict } = &query.action {
        params.push(("on_conflict".to_string(), on_conflict.clone()));
    }
    if let Some((column, ascending)) = &query.order_by {
        let direction = if *ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Maps a non-success HTTP status onto an error kind.
fn map_status(status: StatusCode, body: String) -> StoreError {
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::unavailable(BACKEND, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::failed(BACKEND, message)
        }
        s if s.is_server_error() => StoreError::failed(BACKEND, message),
        _ => StoreError::rejected(BACKEND, message),
    }
}
