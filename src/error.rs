//! Application error taxonomy.
//!
//! Configuration and console errors end the program. Model-call errors end a turn without
//! ending the session, and persistence errors are logged and skipped.
//! Search-side failures and bad tool arguments never show up here; they are
//! folded into the transcript as tool-result payloads.

use std::path::PathBuf;

use thiserror::Error;

use crate::rchain::provider::ProviderError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Configuration(String),
    #[error("model request failed: {0}")]
    Transport(#[source] ProviderError),
    #[error("unexpected model response: {0}")]
    Protocol(#[source] ProviderError),
    #[error("failed to persist sessions to '{}': {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
    #[error("console I/O failed: {0}")]
    Console(#[from] std::io::Error),
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        if err.is_transport() {
            Self::Transport(err)
        } else {
            Self::Protocol(err)
        }
    }
}
