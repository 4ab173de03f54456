//! Conversational breach lookup: an OpenAI chat model that can call a
//! DeHashed search tool, with per-session history kept on disk.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod dehashed;
pub mod error;
pub mod logging;
pub mod rchain;
pub mod session;
