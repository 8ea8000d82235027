//! Model provider contract.
//!
//! Providers expose `generate` and, optionally, native streaming via
//! `generate_stream`. Providers without native streams inherit the default
//! adapter which synthesizes one non-final chunk followed by the terminator.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use reefbot_core::EngineError;

/// Per-request generation policy.
#[derive(Clone, Debug, Default)]
pub struct GenerationPolicy {
    /// Providers to try, in order, after the requested one fails.
    pub fallback_provider_ids: Vec<String>,
    /// Ask the provider to stream tokens when it can.
    pub stream_tokens: bool,
    /// Allow cooperative cancellation through `cancellation_token`.
    pub allow_cancellation: bool,
    /// Token identifying this generation for cancellation.
    pub cancellation_token: Option<String>,
    /// Opaque hints forwarded to local runtimes.
    pub local_runtime_hints: BTreeMap<String, String>,
}

/// A model generation request.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub prompt: String,
    /// Explicit provider selection; checked first in dispatch order.
    pub provider_id: Option<String>,
    pub policy: Option<GenerationPolicy>,
    /// Metadata-driven dispatch: `fallbackProviderID` is honored after the
    /// policy fallbacks.
    pub metadata: BTreeMap<String, String>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        ModelRequest {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_policy(mut self, policy: GenerationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// A successful generation, carrying the IDs that actually produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
}

/// One chunk of a streamed generation. The terminator is the first chunk
/// with `is_final == true`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelStreamChunk {
    pub text: String,
    pub is_final: bool,
}

/// Boxed async sequence of stream chunks.
pub type ModelStream = Pin<Box<dyn Stream<Item = ModelStreamChunk> + Send>>;

/// Trait all model providers implement.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider identifier used in dispatch and diagnostics.
    fn id(&self) -> &str;

    /// Model identifier reported on responses.
    fn model_id(&self) -> &str;

    /// One-shot generation.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, EngineError>;

    /// Streamed generation. The default adapter wraps `generate` into a
    /// single non-final chunk plus the terminator.
    async fn generate_stream(&self, request: &ModelRequest) -> Result<ModelStream, EngineError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![
            ModelStreamChunk {
                text: response.text,
                is_final: false,
            },
            ModelStreamChunk {
                text: String::new(),
                is_final: true,
            },
        ])))
    }
}
