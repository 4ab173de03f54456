//! Breach-data search: the HTTP client and the `search_dehashed` tool the
//! model can call.

pub mod client;
pub mod invoker;

pub use client::{DehashedClient, SearchAuth, SearchError, SearchOutcome};
pub use invoker::{DehashedTool, SEARCH_TOOL_NAME, ToolArgumentError, ToolInvoker, ToolRequest};
