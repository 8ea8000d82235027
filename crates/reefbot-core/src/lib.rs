//! Reefbot Core — shared foundation of the agent engine.
//!
//! This crate contains everything the channel, provider, skill, and runtime
//! layers build on:
//! - **types**: inbound/outbound message values and conversation turns
//! - **error**: the typed engine error taxonomy
//! - **config**: forward-compatible typed configuration + JSON loader
//! - **routing**: session-key derivation and route → agent resolution
//! - **session**: session records with atomic JSON persistence
//! - **memory**: bounded per-session transcript with prompt-safe escaping
//! - **diagnostics**: bounded event ring + rolling usage counters
//! - **workspace**: canonical path-jail enforcement
//! - **bootstrap**: optional persona/memory markdown loading
//! - **credentials**: named-secret storage backends
//! - **audit**: static security scan of config and state paths

pub mod audit;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod memory;
pub mod routing;
pub mod session;
pub mod types;
pub mod utils;
pub mod workspace;

pub use config::schema::Config;
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, DiagnosticsPipeline, UsageSnapshot};
pub use error::EngineError;
pub use memory::ConversationMemoryStore;
pub use session::{SessionRecord, SessionStore};
pub use types::{InboundMessage, OutboundMessage, Route};
pub use workspace::WorkspaceGuard;
