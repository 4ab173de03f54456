use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::rchain::chat_runtime::{RequestFailure, RetryConfig, send_with_retry};

pub const DEHASHED_BASE_URL: &str = "https://api.dehashed.com";

/// Fields forwarded from each entry. Everything else the provider returns
/// is dropped before it reaches the model.
pub const PROJECTED_FIELDS: &[&str] = &[
    "email",
    "username",
    "password",
    "hashed_password",
    "name",
    "database_name",
    "ip_address",
    "phone",
    "address",
];

#[derive(Debug, Clone)]
pub enum SearchAuth {
    /// HTTP basic auth with the account email and API key.
    Basic { email: String, api_key: String },
    Bearer(String),
}

impl SearchAuth {
    pub fn from_credentials(api_key: &str, email: Option<&str>) -> Self {
        match email.map(str::trim).filter(|email| !email.is_empty()) {
            Some(email) => Self::Basic {
                email: email.to_string(),
                api_key: api_key.to_string(),
            },
            None => Self::Bearer(api_key.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("search access denied ({status})")]
    AccessDenied { status: StatusCode, detail: String },
    #[error("search failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected search response: {0}")]
    Protocol(String),
}

/// Result of one search, already bounded to `limit` projected entries.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Entries {
        total: u64,
        entries: Vec<Map<String, Value>>,
    },
    /// The provider reported a match count without returning entries.
    CountOnly { count: u64 },
    NoResults,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    entries: Option<Vec<Value>>,
    total: Option<u64>,
    results_found: Option<u64>,
    success: Option<bool>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DehashedClient {
    client: reqwest::Client,
    endpoint: String,
    auth: SearchAuth,
    page_size: usize,
    timeout_secs: Option<u64>,
}

impl DehashedClient {
    pub fn new(base_url: &str, auth: SearchAuth, page_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            auth,
            page_size: page_size.max(1),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Runs `query` once. There is no retry; callers surface failures
    /// instead.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let size = self.page_size.to_string();
        debug!(endpoint = %self.endpoint, size = self.page_size, "breach search request");

        let response = send_with_retry(
            || {
                let request = self
                    .client
                    .get(&self.endpoint)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .query(&[("query", query), ("page", "1"), ("size", size.as_str())]);
                match &self.auth {
                    SearchAuth::Basic { email, api_key } => request.basic_auth(email, Some(api_key)),
                    SearchAuth::Bearer(token) => request.bearer_auth(token),
                }
            },
            RetryConfig {
                timeout_secs: self.timeout_secs,
                ..RetryConfig::ONCE
            },
        )
        .await
        .map_err(|failure| match failure {
            RequestFailure::Request(source) => SearchError::Transport(source),
            RequestFailure::Api { status, body } => classify_status(status, &body),
        })?;

        let raw = response.text().await.map_err(SearchError::Transport)?;
        interpret(&raw, self.page_size)
    }
}

fn truncate(body: &str) -> String {
    body.trim().chars().take(200).collect()
}

fn classify_status(status: StatusCode, body: &str) -> SearchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SearchError::AccessDenied {
            status,
            detail: truncate(body),
        },
        _ => SearchError::Status {
            status,
            body: truncate(body),
        },
    }
}

fn project(entry: &Map<String, Value>) -> Map<String, Value> {
    PROJECTED_FIELDS
        .iter()
        .filter_map(|field| {
            let value = entry.get(*field)?;
            let empty = match value {
                Value::Null => true,
                Value::String(text) => text.trim().is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            (!empty).then(|| (field.to_string(), value.clone()))
        })
        .collect()
}

fn interpret(raw: &str, limit: usize) -> Result<SearchOutcome, SearchError> {
    let body: SearchResponse =
        serde_json::from_str(raw).map_err(|err| SearchError::Protocol(err.to_string()))?;

    if body.success == Some(false) {
        let message = body.message.unwrap_or_else(|| "search was not successful".to_string());
        return Err(SearchError::Protocol(message));
    }

    let entries = body
        .entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect::<Vec<_>>();

    if !entries.is_empty() {
        let total = body.total.unwrap_or(entries.len() as u64);
        let entries = entries.iter().take(limit).map(project).collect();
        return Ok(SearchOutcome::Entries { total, entries });
    }

    match body.results_found.or(body.total) {
        Some(count) if count > 0 => Ok(SearchOutcome::CountOnly { count }),
        _ => Ok(SearchOutcome::NoResults),
    }
}
