use tracing::{debug, warn};

use crate::conversation::transcript::Transcript;
use crate::dehashed::invoker::ToolInvoker;
use crate::error::ChatError;
use crate::rchain::provider::{AssistantReply, ChatMessage, ChatModel, ProviderError, Usage};

/// Final answer of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    /// Name of the tool executed during the turn, if any.
    pub tool: Option<String>,
    pub usage: Option<Usage>,
}

/// Drives one user turn: a model call, at most one tool call, and a second
/// model call that sees the tool result.
pub struct Orchestrator<'a> {
    model: &'a dyn ChatModel,
    tools: &'a dyn ToolInvoker,
}

fn final_text(content: Option<String>) -> Result<String, ChatError> {
    content
        .filter(|content| !content.trim().is_empty())
        .ok_or(ChatError::Protocol(ProviderError::EmptyResponse))
}

impl<'a> Orchestrator<'a> {
    pub fn new(model: &'a dyn ChatModel, tools: &'a dyn ToolInvoker) -> Self {
        Self { model, tools }
    }

    /// Appends `user_text` to `transcript` and produces the assistant's
    /// reply.
    ///
    /// On error the transcript is rolled back to just after the user
    /// message, so a half-finished tool exchange is never kept.
    pub async fn advance(
        &self,
        transcript: &mut Transcript,
        user_text: &str,
    ) -> Result<TurnReply, ChatError> {
        transcript.push(ChatMessage::user(user_text));
        let checkpoint = transcript.len();

        let result = self.run_turn(transcript).await;
        if let Err(err) = &result {
            warn!(error = %err, "turn failed");
            transcript.truncate(checkpoint);
        }
        result
    }

    async fn run_turn(&self, transcript: &mut Transcript) -> Result<TurnReply, ChatError> {
        let mut usage = None;

        let declared = self.tools.definitions();
        debug!(messages = transcript.len(), "first model call");
        let AssistantReply {
            content,
            tool_calls,
            usage: first_usage,
        } = self.model.complete(transcript.messages(), &declared).await?;
        Usage::accumulate(&mut usage, first_usage);

        if tool_calls.len() > 1 {
            warn!(
                requested = tool_calls.len(),
                "model requested several tool calls; only the first is executed"
            );
        }
        let Some(call) = tool_calls.into_iter().next() else {
            let text = final_text(content)?;
            transcript.push(ChatMessage::assistant(text.clone()));
            return Ok(TurnReply {
                text,
                tool: None,
                usage,
            });
        };

        transcript.push(ChatMessage::assistant_tool_call(content, call.clone()));
        debug!(tool = %call.name, "tool call");
        let result = self.tools.invoke(&call.name, &call.arguments).await;
        transcript.push(ChatMessage::tool_result(&call, result));

        // No tools on the follow-up call: the model has to answer in prose.
        debug!(messages = transcript.len(), "second model call");
        let second = self.model.complete(transcript.messages(), &[]).await?;
        Usage::accumulate(&mut usage, second.usage);
        let text = final_text(second.content)?;
        transcript.push(ChatMessage::assistant(text.clone()));

        Ok(TurnReply {
            text,
            tool: Some(call.name),
            usage,
        })
    }
}
