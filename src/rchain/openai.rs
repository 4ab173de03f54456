use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::rchain::chat_runtime::{RequestFailure, RetryConfig, send_with_retry};
use crate::rchain::provider::{
    AssistantReply, ChatMessage, ChatModel, ProviderError, Role, Usage,
};
use crate::rchain::tools::{ToolCall, ToolDefinition};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Request knobs shared by every call of one client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    options: ChatOptions,
}

impl OpenAiChat {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        options: ChatOptions,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<[WireToolCall<'a>; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: String,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let tool_calls = message.tool_call.as_ref().map(|call| {
            [WireToolCall {
                id: &call.id,
                kind: "function",
                function: WireFunction {
                    name: &call.name,
                    arguments: call.arguments_json(),
                },
            }]
        });
        Self {
            role: message.role,
            content: message.content.as_deref(),
            tool_calls,
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

fn parse_reply(raw: &str) -> Result<AssistantReply, ProviderError> {
    let body: ChatCompletionResponse = serde_json::from_str(raw)
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
    let message = body
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?
        .message;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|call| !call.function.name.is_empty())
        .map(|call| ToolCall::from_wire(call.id, call.function.name, &call.function.arguments))
        .collect();

    Ok(AssistantReply {
        content: message.content,
        tool_calls,
        usage: body.usage.map(|usage| Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
    })
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, ProviderError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            tools: tools.iter().map(ToolDefinition::to_json).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        debug!(
            model = %self.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "chat completion request"
        );

        let response = send_with_retry(
            || {
                self.client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&payload)
            },
            RetryConfig {
                timeout_secs: self.options.timeout_secs,
                retries: self.options.retries,
                retry_delay_ms: self.options.retry_delay_ms,
            },
        )
        .await
        .map_err(|failure| match failure {
            RequestFailure::Request(source) => ProviderError::Request { source },
            RequestFailure::Api { status, body } => ProviderError::Api {
                status,
                body: body.chars().take(200).collect(),
            },
        })?;

        let raw = response
            .text()
            .await
            .map_err(|source| ProviderError::Request { source })?;
        let reply = parse_reply(&raw)?;

        debug!(
            tool_calls = reply.tool_calls.len(),
            has_content = reply.content.is_some(),
            "chat completion response"
        );
        Ok(reply)
    }
}
