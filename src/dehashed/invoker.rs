use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::dehashed::client::{DehashedClient, SearchError, SearchOutcome};
use crate::rchain::tools::{ToolDefinition, ToolFunction, ToolParam, ToolParamType};

pub const SEARCH_TOOL_NAME: &str = "search_dehashed";

const ACCESS_DENIED_SUGGESTION: &str = "The breach search API rejected the configured credentials. \
Search requires an active DeHashed API subscription; check DEHASHED_API_KEY and DEHASHED_EMAIL. \
Whether a password is exposed can still be checked without an account through the \
Have I Been Pwned Pwned Passwords range API.";

/// Executes tool calls requested by the model.
///
/// `invoke` is total: every failure is encoded in the returned payload so
/// it can be folded into the transcript for the model to read.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn invoke(&self, name: &str, arguments: &Value) -> String;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolArgumentError {
    #[error("unknown tool")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("invalid arguments: query must not be empty")]
    EmptyQuery,
}

/// Validated tool call, one variant per registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    SearchDehashed { query: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
}

impl ToolRequest {
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, ToolArgumentError> {
        match name {
            SEARCH_TOOL_NAME => {
                if !arguments.is_object() {
                    return Err(ToolArgumentError::InvalidArguments(
                        "expected a JSON object".to_string(),
                    ));
                }
                let args = SearchArgs::deserialize(arguments)
                    .map_err(|err| ToolArgumentError::InvalidArguments(err.to_string()))?;
                let query = args.query.trim();
                if query.is_empty() {
                    return Err(ToolArgumentError::EmptyQuery);
                }
                Ok(Self::SearchDehashed {
                    query: query.to_string(),
                })
            }
            other => Err(ToolArgumentError::UnknownTool(other.to_string())),
        }
    }
}

pub fn search_tool_definition() -> ToolDefinition {
    ToolDefinition::from_function(
        ToolFunction::new(
            SEARCH_TOOL_NAME,
            "Search the DeHashed breach database. Use field-prefixed queries such as \
             email:alice@example.com, username:alice, password:hunter2, domain:example.com \
             or ip_address:203.0.113.7.",
        )
        .with_param(ToolParam::required(
            "query",
            ToolParamType::String,
            "DeHashed search query, e.g. password:hunter2",
        )),
    )
}

fn argument_error_payload(err: &ToolArgumentError) -> Value {
    match err {
        ToolArgumentError::UnknownTool(name) => json!({
            "error": err.to_string(),
            "tool": name,
            "available_tools": [SEARCH_TOOL_NAME],
        }),
        _ => json!({ "error": err.to_string() }),
    }
}

/// "password:hunter2" reads as "Password", "hashed_password:..." as
/// "Hashed password".
fn query_subject(query: &str) -> String {
    let field = query
        .split_once(':')
        .map(|(field, _)| field.trim())
        .filter(|field| !field.is_empty() && field.chars().all(|c| c.is_ascii_alphabetic() || c == '_'))
        .unwrap_or("query")
        .replace('_', " ");
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => "Query".to_string(),
    }
}

pub fn outcome_payload(query: &str, outcome: SearchOutcome) -> Value {
    match outcome {
        SearchOutcome::Entries { total, entries } => json!({
            "count": total,
            "results": entries,
        }),
        SearchOutcome::CountOnly { count } => {
            let noun = if count == 1 { "breach" } else { "breaches" };
            json!({
                "found": true,
                "count": count,
                "message": format!("{} found in {count} {noun}", query_subject(query)),
            })
        }
        SearchOutcome::NoResults => json!({ "message": "no results" }),
    }
}

pub fn search_error_payload(err: &SearchError) -> Value {
    match err {
        SearchError::AccessDenied { status, detail } => json!({
            "error": "access denied",
            "status": status.as_u16(),
            "detail": detail,
            "suggestion": ACCESS_DENIED_SUGGESTION,
        }),
        other => json!({ "error": other.to_string() }),
    }
}

/// The `search_dehashed` tool backed by a [`DehashedClient`].
#[derive(Debug, Clone)]
pub struct DehashedTool {
    client: DehashedClient,
}

impl DehashedTool {
    pub fn new(client: DehashedClient) -> Self {
        Self { client }
    }

    async fn execute(&self, request: ToolRequest) -> Value {
        match request {
            ToolRequest::SearchDehashed { query } => match self.client.search(&query).await {
                Ok(outcome) => outcome_payload(&query, outcome),
                Err(err) => {
                    warn!(error = %err, "breach search failed");
                    search_error_payload(&err)
                }
            },
        }
    }
}

#[async_trait]
impl ToolInvoker for DehashedTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![search_tool_definition()]
    }

    async fn invoke(&self, name: &str, arguments: &Value) -> String {
        let payload = match ToolRequest::parse(name, arguments) {
            Ok(request) => {
                info!(tool = name, "invoking tool");
                self.execute(request).await
            }
            Err(err) => {
                warn!(tool = name, error = %err, "rejected tool call");
                argument_error_payload(&err)
            }
        };
        payload.to_string()
    }
}
