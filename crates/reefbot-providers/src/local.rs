//! Local-runtime provider — wraps an embedded model engine.
//!
//! The engine itself (llama.cpp binding, CoreML wrapper, …) is an external
//! collaborator behind [`LocalModelEngine`]. The provider translates the
//! request policy into engine calls: `stream_tokens` drives the token
//! callback, `allow_cancellation` + `cancellation_token` thread through to
//! the engine, and `local_runtime_hints` pass opaquely.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use reefbot_core::EngineError;

use crate::traits::{ModelProvider, ModelRequest, ModelResponse, ModelStream, ModelStreamChunk};

/// Callback receiving generated tokens as they appear.
pub type TokenCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Capability set of an embedded local model engine.
#[async_trait]
pub trait LocalModelEngine: Send + Sync {
    async fn load_model(&self, model_path: &str) -> Result<(), EngineError>;
    async fn unload_model(&self) -> Result<(), EngineError>;
    async fn is_model_loaded(&self) -> bool;

    /// Generate a completion. `on_token` is invoked per token when given;
    /// `cancellation_token` identifies this generation for
    /// [`cancel_generation`](Self::cancel_generation). A generation whose
    /// token was cancelled fails with a cancellation error.
    async fn generate(
        &self,
        prompt: &str,
        hints: &BTreeMap<String, String>,
        on_token: Option<TokenCallback>,
        cancellation_token: Option<&str>,
    ) -> Result<String, EngineError>;

    async fn switch_runtime(&self, from: &str, to: &str) -> Result<(), EngineError>;
    async fn cancel_generation(&self, token: Option<&str>) -> Result<(), EngineError>;
    async fn save_state(&self) -> Result<Vec<u8>, EngineError>;
    async fn restore_state(&self, state: &[u8]) -> Result<(), EngineError>;
}

/// Provider adapter over a [`LocalModelEngine`].
pub struct LocalRuntimeProvider {
    engine: Arc<dyn LocalModelEngine>,
    model_path: String,
    model_id: String,
}

impl LocalRuntimeProvider {
    pub fn new(
        engine: Arc<dyn LocalModelEngine>,
        model_path: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        LocalRuntimeProvider {
            engine,
            model_path: model_path.into(),
            model_id: model_id.into(),
        }
    }

    async fn ensure_loaded(&self) -> Result<(), EngineError> {
        if !self.engine.is_model_loaded().await {
            debug!(model_path = %self.model_path, "loading local model");
            self.engine.load_model(&self.model_path).await?;
        }
        Ok(())
    }

    fn cancellation_token(request: &ModelRequest) -> Option<String> {
        let policy = request.policy.as_ref()?;
        if policy.allow_cancellation {
            policy.cancellation_token.clone()
        } else {
            None
        }
    }

    fn hints(request: &ModelRequest) -> BTreeMap<String, String> {
        request
            .policy
            .as_ref()
            .map(|p| p.local_runtime_hints.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for LocalRuntimeProvider {
    fn id(&self) -> &str {
        "local"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, EngineError> {
        self.ensure_loaded().await?;

        let token = Self::cancellation_token(request);
        let text = self
            .engine
            .generate(&request.prompt, &Self::hints(request), None, token.as_deref())
            .await?;

        Ok(ModelResponse {
            text,
            provider_id: self.id().to_string(),
            model_id: self.model_id.clone(),
        })
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<ModelStream, EngineError> {
        let stream_tokens = request
            .policy
            .as_ref()
            .map(|p| p.stream_tokens)
            .unwrap_or(false);
        if !stream_tokens {
            // Fall back to the synthesized single-chunk stream
            let response = self.generate(request).await?;
            return Ok(Box::pin(futures_util::stream::iter(vec![
                ModelStreamChunk {
                    text: response.text,
                    is_final: false,
                },
                ModelStreamChunk {
                    text: String::new(),
                    is_final: true,
                },
            ])));
        }

        self.ensure_loaded().await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<ModelStreamChunk>(64);
        let engine = Arc::clone(&self.engine);
        let prompt = request.prompt.clone();
        let hints = Self::hints(request);
        let token = Self::cancellation_token(request);

        tokio::spawn(async move {
            let token_tx = tx.clone();
            let on_token: TokenCallback = Arc::new(move |text: String| {
                let _ = token_tx.try_send(ModelStreamChunk {
                    text,
                    is_final: false,
                });
            });

            let result = engine
                .generate(&prompt, &hints, Some(on_token), token.as_deref())
                .await;
            if let Err(e) = result {
                debug!(error = %e, "local stream generation ended with error");
            }
            let _ = tx
                .send(ModelStreamChunk {
                    text: String::new(),
                    is_final: true,
                })
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::GenerationPolicy;
    use futures_util::StreamExt;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// An engine that emits one token per word and honors cancellation.
    #[derive(Default)]
    struct MockEngine {
        loaded: Mutex<bool>,
        cancelled: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl LocalModelEngine for MockEngine {
        async fn load_model(&self, _model_path: &str) -> Result<(), EngineError> {
            *self.loaded.lock().unwrap() = true;
            Ok(())
        }

        async fn unload_model(&self) -> Result<(), EngineError> {
            *self.loaded.lock().unwrap() = false;
            Ok(())
        }

        async fn is_model_loaded(&self) -> bool {
            *self.loaded.lock().unwrap()
        }

        async fn generate(
            &self,
            prompt: &str,
            _hints: &BTreeMap<String, String>,
            on_token: Option<TokenCallback>,
            cancellation_token: Option<&str>,
        ) -> Result<String, EngineError> {
            if let Some(token) = cancellation_token {
                if self.cancelled.lock().unwrap().contains(token) {
                    return Err(EngineError::Cancelled(token.to_string()));
                }
            }
            if let Some(cb) = on_token {
                for word in prompt.split_whitespace() {
                    cb(word.to_string());
                }
            }
            Ok(format!("local:{prompt}"))
        }

        async fn switch_runtime(&self, _from: &str, _to: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn cancel_generation(&self, token: Option<&str>) -> Result<(), EngineError> {
            if let Some(token) = token {
                self.cancelled.lock().unwrap().insert(token.to_string());
            }
            Ok(())
        }

        async fn save_state(&self) -> Result<Vec<u8>, EngineError> {
            Ok(Vec::new())
        }

        async fn restore_state(&self, _state: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn make_provider() -> (LocalRuntimeProvider, Arc<MockEngine>) {
        let engine = Arc::new(MockEngine::default());
        let provider =
            LocalRuntimeProvider::new(engine.clone(), "/models/test.gguf", "test-local-1");
        (provider, engine)
    }

    #[tokio::test]
    async fn test_generate_loads_model_lazily() {
        let (provider, engine) = make_provider();
        assert!(!engine.is_model_loaded().await);

        let response = provider.generate(&ModelRequest::new("hi")).await.unwrap();
        assert_eq!(response.text, "local:hi");
        assert_eq!(response.provider_id, "local");
        assert!(engine.is_model_loaded().await);
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_generation() {
        let (provider, engine) = make_provider();
        engine.cancel_generation(Some("job-1")).await.unwrap();

        let request = ModelRequest::new("hi").with_policy(GenerationPolicy {
            allow_cancellation: true,
            cancellation_token: Some("job-1".into()),
            ..Default::default()
        });

        let err = provider.generate(&request).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("cancel"));
    }

    #[tokio::test]
    async fn test_cancellation_ignored_when_not_allowed() {
        let (provider, engine) = make_provider();
        engine.cancel_generation(Some("job-1")).await.unwrap();

        // allow_cancellation is false, so the token must not be forwarded
        let request = ModelRequest::new("hi").with_policy(GenerationPolicy {
            allow_cancellation: false,
            cancellation_token: Some("job-1".into()),
            ..Default::default()
        });

        assert!(provider.generate(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_streaming() {
        let (provider, _engine) = make_provider();
        let request = ModelRequest::new("one two three").with_policy(GenerationPolicy {
            stream_tokens: true,
            ..Default::default()
        });

        let chunks: Vec<ModelStreamChunk> = provider
            .generate_stream(&request)
            .await
            .unwrap()
            .collect()
            .await;

        let texts: Vec<&str> = chunks
            .iter()
            .filter(|c| !c.is_final)
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(chunks.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn test_stream_without_policy_synthesizes_pair() {
        let (provider, _engine) = make_provider();
        let chunks: Vec<ModelStreamChunk> = provider
            .generate_stream(&ModelRequest::new("hi"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "local:hi");
        assert!(chunks[1].is_final);
    }
}
