//! Model provider layer for Reefbot.
//!
//! # Architecture
//!
//! - [`traits::ModelProvider`] — trait all providers implement, with a
//!   default streaming adapter for providers without native streams
//! - [`router::ModelRouter`] — provider directory with ordered fallback
//! - [`echo::EchoProvider`] — always-available offline default
//! - [`local::LocalRuntimeProvider`] — wraps an embedded model engine
//! - [`http::OpenAiHttpProvider`] — OpenAI-compatible `/chat/completions`

pub mod echo;
pub mod http;
pub mod local;
pub mod router;
pub mod traits;

pub use echo::EchoProvider;
pub use http::OpenAiHttpProvider;
pub use local::{LocalModelEngine, LocalRuntimeProvider};
pub use router::ModelRouter;
pub use traits::{
    GenerationPolicy, ModelProvider, ModelRequest, ModelResponse, ModelStream, ModelStreamChunk,
};
