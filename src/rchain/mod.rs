//! Chat-model integration.
//!
//! Typed transcript messages, the `ChatModel` seam used by the conversation
//! orchestrator, tool declarations, and the OpenAI-compatible client.

pub(crate) mod chat_runtime;
/// OpenAI chat-completions client.
pub mod openai;
/// Transcript messages, usage, and the chat model trait.
pub mod provider;
/// Tool schema and tool-call payload helpers.
pub mod tools;
