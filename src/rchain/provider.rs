use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rchain::tools::{ToolCall, ToolDefinition};

/// Transcript roles. `Tool` entries carry a tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One transcript entry, in the shape it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set on assistant entries that requested a tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Tool name on tool-result entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call: None,
            name: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant entry requesting `call`. Any text the model sent alongside
    /// the request is kept.
    pub fn assistant_tool_call(content: Option<String>, call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: content.filter(|text| !text.trim().is_empty()),
            tool_call: Some(call),
            name: None,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call: None,
            name: Some(call.name.clone()),
            tool_call_id: Some(call.id.clone()),
        }
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Adds `other` into `total`, leaving `total` unset only if neither
    /// side reported usage.
    pub fn accumulate(total: &mut Option<Usage>, other: Option<Usage>) {
        let Some(other) = other else {
            return;
        };
        let sum = total.get_or_insert_with(Usage::default);
        sum.prompt_tokens = sum.prompt_tokens.saturating_add(other.prompt_tokens);
        sum.completion_tokens = sum.completion_tokens.saturating_add(other.completion_tokens);
        sum.total_tokens = sum.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Candidate assistant message returned by one model call.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("chat request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("chat API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("chat response did not contain message content")]
    EmptyResponse,
    #[error("chat response could not be decoded: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transport-level failures, as opposed to a reply that arrived but
    /// could not be used.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Api { .. })
    }
}

/// Chat endpoint seen by the orchestrator.
///
/// An empty `tools` slice means no tool is declared, which forces a plain
/// natural-language reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persisted_shape_omits_absent_fields() {
        let value = serde_json::to_value(ChatMessage::user("hi")).expect("serializes");
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let call = ToolCall {
            id: "call_1".into(),
            name: "search_dehashed".into(),
            arguments: json!({"query": "email:a@b.c"}),
        };
        let value = serde_json::to_value(ChatMessage::tool_result(&call, "{}")).expect("serializes");
        assert_eq!(
            value,
            json!({"role": "tool", "content": "{}", "name": "search_dehashed", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn tool_call_entry_drops_blank_content() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "search_dehashed".into(),
            arguments: json!({}),
        };
        let message = ChatMessage::assistant_tool_call(Some("  ".into()), call);
        assert!(message.content.is_none());
        assert!(message.tool_call.is_some());
    }

    #[test]
    fn usage_accumulates_only_reported_values() {
        let mut total = None;
        Usage::accumulate(&mut total, None);
        assert_eq!(total, None);

        let one = Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        };
        Usage::accumulate(&mut total, Some(one));
        Usage::accumulate(&mut total, Some(one));
        assert_eq!(
            total,
            Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 4,
                total_tokens: 24
            })
        );
    }
}
