//! Model router — provider directory with ordered fallback.
//!
//! Dispatch order for a request:
//! 1. `request.provider_id` if registered
//! 2. `request.policy.fallback_provider_ids` in order, skipping unknowns
//! 3. `request.metadata["fallbackProviderID"]` if registered
//! 4. the default provider
//!
//! Each candidate is tried once; on error the router moves on. If all fail,
//! the last error is returned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use reefbot_core::EngineError;

use crate::traits::{ModelProvider, ModelRequest, ModelResponse, ModelStream};

/// Provider directory + fallback dispatcher.
pub struct ModelRouter {
    providers: RwLock<HashMap<String, Arc<dyn ModelProvider>>>,
    default_id: RwLock<Option<String>>,
    /// Per-provider minimum call spacing; calls arriving early are delayed.
    throttle_ms: RwLock<HashMap<String, u64>>,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRouter {
    pub fn new() -> Self {
        ModelRouter {
            providers: RwLock::new(HashMap::new()),
            default_id: RwLock::new(None),
            throttle_ms: RwLock::new(HashMap::new()),
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Register a provider. Overwrites any previous provider with the same
    /// ID. The first registered provider becomes the default.
    pub fn register(&self, provider: Arc<dyn ModelProvider>) {
        let id = provider.id().to_string();
        info!(provider = %id, model = %provider.model_id(), "registered model provider");

        let mut providers = self.providers.write().unwrap();
        if providers.insert(id.clone(), provider).is_some() {
            warn!(provider = %id, "replaced existing model provider");
        }

        let mut default_id = self.default_id.write().unwrap();
        if default_id.is_none() {
            *default_id = Some(id);
        }
    }

    /// Set the default provider. Fails if the ID is unknown.
    pub fn set_default_provider_id(&self, id: &str) -> Result<(), EngineError> {
        if !self.providers.read().unwrap().contains_key(id) {
            return Err(EngineError::InvalidConfiguration(format!(
                "unknown default provider: {id}"
            )));
        }
        *self.default_id.write().unwrap() = Some(id.to_string());
        Ok(())
    }

    /// Registered provider IDs, sorted.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Set the minimum interval between calls to one provider.
    pub fn set_throttle(&self, provider_id: &str, min_interval_ms: u64) {
        self.throttle_ms
            .write()
            .unwrap()
            .insert(provider_id.to_string(), min_interval_ms);
    }

    /// Generate through the first candidate that succeeds.
    pub async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, EngineError> {
        let candidates = self.candidates(request);
        if candidates.is_empty() {
            return Err(EngineError::Unavailable(
                "no model providers registered".into(),
            ));
        }

        let mut last_err: Option<EngineError> = None;
        for id in candidates {
            let Some(provider) = self.provider(&id) else {
                continue;
            };

            self.apply_throttle(&id).await;

            debug!(provider = %id, "model generate attempt");
            match provider.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(provider = %id, error = %e, "provider generate failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EngineError::Unavailable("all model providers failed".into())))
    }

    /// Streamed counterpart of [`generate`](Self::generate); same candidate
    /// order, falls through on stream-setup errors.
    pub async fn generate_stream(&self, request: &ModelRequest) -> Result<ModelStream, EngineError> {
        let candidates = self.candidates(request);
        if candidates.is_empty() {
            return Err(EngineError::Unavailable(
                "no model providers registered".into(),
            ));
        }

        let mut last_err: Option<EngineError> = None;
        for id in candidates {
            let Some(provider) = self.provider(&id) else {
                continue;
            };

            self.apply_throttle(&id).await;

            match provider.generate_stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!(provider = %id, error = %e, "provider stream failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EngineError::Unavailable("all model providers failed".into())))
    }

    fn provider(&self, id: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.read().unwrap().get(id).cloned()
    }

    /// Ordered, deduplicated candidate IDs for a request, unknowns skipped.
    fn candidates(&self, request: &ModelRequest) -> Vec<String> {
        let providers = self.providers.read().unwrap();
        let mut out: Vec<String> = Vec::new();
        let mut push = |id: &str| {
            if providers.contains_key(id) && !out.iter().any(|seen| seen == id) {
                out.push(id.to_string());
            }
        };

        if let Some(id) = &request.provider_id {
            push(id);
        }
        if let Some(policy) = &request.policy {
            for id in &policy.fallback_provider_ids {
                push(id);
            }
        }
        if let Some(id) = request.metadata.get("fallbackProviderID") {
            push(id);
        }
        if let Some(id) = self.default_id.read().unwrap().as_deref() {
            push(id);
        }
        out
    }

    async fn apply_throttle(&self, id: &str) {
        let min_interval = self
            .throttle_ms
            .read()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0);
        if min_interval == 0 {
            return;
        }

        let wait = {
            let mut last_call = self.last_call.lock().unwrap();
            let now = Instant::now();
            let wait = match last_call.get(id) {
                Some(last) => {
                    let elapsed = now.duration_since(*last);
                    Duration::from_millis(min_interval).saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            last_call.insert(id.to_string(), now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::GenerationPolicy;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A provider that fails a fixed number of times, or always.
    struct ScriptedProvider {
        id: String,
        output: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(id: &str, output: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                output: Some(output.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                output: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn model_id(&self) -> &str {
            "scripted-1"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<ModelResponse, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.output {
                Some(text) => Ok(ModelResponse {
                    text: text.clone(),
                    provider_id: self.id.clone(),
                    model_id: "scripted-1".into(),
                }),
                None => Err(EngineError::Unavailable(format!("{} failed", self.id))),
            }
        }
    }

    #[tokio::test]
    async fn test_first_provider_becomes_default() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::ok("echo", "OK"));
        router.register(ScriptedProvider::ok("other", "other"));

        let response = router.generate(&ModelRequest::new("hi")).await.unwrap();
        assert_eq!(response.provider_id, "echo");
    }

    #[tokio::test]
    async fn test_set_default_provider() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::ok("a", "from a"));
        router.register(ScriptedProvider::ok("b", "from b"));
        router.set_default_provider_id("b").unwrap();

        let response = router.generate(&ModelRequest::new("hi")).await.unwrap();
        assert_eq!(response.provider_id, "b");
    }

    #[test]
    fn test_set_default_unknown_fails() {
        let router = ModelRouter::new();
        let err = router.set_default_provider_id("ghost").unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[tokio::test]
    async fn test_ordered_fallback_chain() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::failing("primary"));
        router.register(ScriptedProvider::failing("secondary"));
        router.register(ScriptedProvider::ok("tertiary", "tertiary-output"));

        let request = ModelRequest::new("go")
            .with_provider("primary")
            .with_policy(GenerationPolicy {
                fallback_provider_ids: vec!["secondary".into(), "tertiary".into()],
                ..Default::default()
            });

        let response = router.generate(&request).await.unwrap();
        assert_eq!(response.provider_id, "tertiary");
        assert_eq!(response.text, "tertiary-output");
    }

    #[tokio::test]
    async fn test_unknown_fallbacks_skipped() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::ok("real", "real output"));

        let request = ModelRequest::new("go").with_policy(GenerationPolicy {
            fallback_provider_ids: vec!["ghost".into(), "real".into()],
            ..Default::default()
        });

        let response = router.generate(&request).await.unwrap();
        assert_eq!(response.provider_id, "real");
    }

    #[tokio::test]
    async fn test_metadata_fallback_honored() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::failing("primary"));
        router.register(ScriptedProvider::ok("meta", "meta output"));
        router.set_default_provider_id("primary").unwrap();

        let mut request = ModelRequest::new("go");
        request
            .metadata
            .insert("fallbackProviderID".into(), "meta".into());

        let response = router.generate(&request).await.unwrap();
        assert_eq!(response.provider_id, "meta");
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_error() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::failing("a"));
        router.register(ScriptedProvider::failing("b"));
        router.set_default_provider_id("a").unwrap();

        let request = ModelRequest::new("go")
            .with_provider("a")
            .with_policy(GenerationPolicy {
                fallback_provider_ids: vec!["b".into()],
                ..Default::default()
            });

        let err = router.generate(&request).await.unwrap_err();
        // "b" was the last candidate tried — "a" is deduplicated out of the
        // default slot.
        assert!(err.to_string().contains("b failed"));
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let router = ModelRouter::new();
        let err = router.generate(&ModelRequest::new("hi")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_candidates_deduplicated() {
        let router = ModelRouter::new();
        let provider = ScriptedProvider::failing("only");
        router.register(provider.clone());

        let request = ModelRequest::new("go")
            .with_provider("only")
            .with_policy(GenerationPolicy {
                fallback_provider_ids: vec!["only".into()],
                ..Default::default()
            });

        let _ = router.generate(&request).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_falls_back() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::failing("down"));
        router.register(ScriptedProvider::ok("up", "streamed"));

        let request = ModelRequest::new("go")
            .with_provider("down")
            .with_policy(GenerationPolicy {
                fallback_provider_ids: vec!["up".into()],
                ..Default::default()
            });

        let chunks: Vec<_> = router
            .generate_stream(&request)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks[0].text, "streamed");
        assert!(chunks[1].is_final);
    }

    #[tokio::test]
    async fn test_throttle_delays_calls() {
        let router = ModelRouter::new();
        router.register(ScriptedProvider::ok("slow", "ok"));
        router.set_throttle("slow", 50);

        let start = Instant::now();
        router.generate(&ModelRequest::new("1")).await.unwrap();
        router.generate(&ModelRequest::new("2")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
