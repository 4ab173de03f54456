//! The conversation core: transcripts and the turn orchestrator.

pub mod orchestrator;
pub mod transcript;

pub use orchestrator::{Orchestrator, TurnReply};
pub use transcript::Transcript;

/// Scripted fakes shared by orchestrator and turn-loop tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::dehashed::invoker::{ToolInvoker, search_tool_definition};
    use crate::rchain::provider::{AssistantReply, ChatMessage, ChatModel, ProviderError};
    use crate::rchain::tools::{ToolCall, ToolDefinition};

    pub(crate) fn text_reply(text: &str) -> AssistantReply {
        AssistantReply {
            content: Some(text.to_string()),
            ..AssistantReply::default()
        }
    }

    pub(crate) fn tool_reply(id: &str, name: &str, arguments: Value) -> AssistantReply {
        AssistantReply {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
            usage: None,
        }
    }

    #[derive(Debug, Clone)]
    pub(crate) struct ModelCall {
        pub messages: Vec<ChatMessage>,
        pub tool_names: Vec<String>,
    }

    /// Returns queued replies in order and records every request.
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<AssistantReply, ProviderError>>>,
        calls: Mutex<Vec<ModelCall>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<Result<AssistantReply, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<ModelCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
        ) -> Result<AssistantReply, ProviderError> {
            self.calls.lock().expect("calls lock").push(ModelCall {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|tool| tool.name().to_string()).collect(),
            });
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Err(ProviderError::EmptyResponse))
        }
    }

    /// Tool invoker that answers every call with a fixed payload.
    pub(crate) struct RecordingTools {
        payload: String,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingTools {
        pub(crate) fn returning(payload: &str) -> Self {
            Self {
                payload: payload.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for RecordingTools {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![search_tool_definition()]
        }

        async fn invoke(&self, name: &str, arguments: &Value) -> String {
            self.calls
                .lock()
                .expect("calls lock")
                .push((name.to_string(), arguments.clone()));
            self.payload.clone()
        }
    }
}
