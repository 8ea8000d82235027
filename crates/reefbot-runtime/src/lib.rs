//! Reefbot Runtime — the embedded agent runtime and auto-reply engine.
//!
//! This crate contains:
//! - **tools**: the `Tool` trait and registry executed during runs
//! - **runtime**: `AgentRuntime` — prompt → tools → model with a run
//!   deadline, structured run events, and streaming
//! - **reply**: `AutoReplyEngine` — one inbound message to exactly one
//!   outbound reply, end to end

pub mod reply;
pub mod runtime;
pub mod tools;

pub use reply::{AutoReplyConfig, AutoReplyEngine};
pub use runtime::{AgentRuntime, RunOutput, RunRequest, RunStreamEvent, ToolCallRequest};
pub use tools::{Tool, ToolRegistry};
