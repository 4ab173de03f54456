use crate::rchain::provider::{ChatMessage, Role};

/// Ordered message history for one session. The first entry is always the
/// system message.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Rebuilds a transcript from a stored (possibly truncated) record.
    ///
    /// Stored system messages give way to `system_prompt`, and everything
    /// before the first user message is dropped so a tool result can never
    /// lead the history without the call that produced it.
    pub fn resume(system_prompt: impl Into<String>, stored: &[ChatMessage]) -> Self {
        let mut transcript = Self::new(system_prompt);
        transcript.messages.extend(
            stored
                .iter()
                .filter(|message| message.role != Role::System)
                .skip_while(|message| message.role != Role::User)
                .cloned(),
        );
        transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }
}
