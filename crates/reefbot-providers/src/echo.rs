//! Echo provider — the always-available offline default.
//!
//! Returns `"OK"` for an empty prompt and echoes the prompt verbatim
//! otherwise. It exists so the whole engine is exercisable without network
//! access or API keys.

use async_trait::async_trait;

use reefbot_core::EngineError;

use crate::traits::{ModelProvider, ModelRequest, ModelResponse};

/// Offline echo provider.
#[derive(Debug, Default)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        EchoProvider
    }
}

#[async_trait]
impl ModelProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    fn model_id(&self) -> &str {
        "echo-1"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, EngineError> {
        let text = if request.prompt.trim().is_empty() {
            "OK".to_string()
        } else {
            request.prompt.clone()
        };

        Ok(ModelResponse {
            text,
            provider_id: self.id().to_string(),
            model_id: self.model_id().to_string(),
        })
    }
}
