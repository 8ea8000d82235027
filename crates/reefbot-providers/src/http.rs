//! OpenAI-compatible HTTP provider.
//!
//! Talks to any `/chat/completions` endpoint that speaks the OpenAI shape
//! (OpenAI itself, plus the many compatible gateways). Errors map to
//! [`EngineError::Unavailable`] so the router's fallback chain can take
//! over.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use reefbot_core::EngineError;

use crate::traits::{ModelProvider, ModelRequest, ModelResponse};

/// Configuration for one OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiHttpConfig {
    /// Provider ID reported on responses (e.g. "openai",
    /// "openai-compatible").
    pub provider_id: String,
    pub api_key: String,
    /// Base URL; `/chat/completions` is appended.
    pub api_base: String,
    pub model: String,
}

impl Default for OpenAiHttpConfig {
    fn default() -> Self {
        Self {
            provider_id: "openai".to_string(),
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiHttpProvider {
    client: reqwest::Client,
    config: OpenAiHttpConfig,
}

impl OpenAiHttpProvider {
    pub fn new(config: OpenAiHttpConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        OpenAiHttpProvider { client, config }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ModelProvider for OpenAiHttpProvider {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, EngineError> {
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        debug!(provider = %self.id(), url = %self.completions_url(), "chat completion request");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.id())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!(
                "{}: HTTP {status}: {body}",
                self.id()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: invalid response: {e}", self.id())))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                EngineError::Unavailable(format!("{}: no choices in response", self.id()))
            })?;

        Ok(ModelResponse {
            text,
            provider_id: self.config.provider_id.clone(),
            model_id: parsed.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_provider(base: &str) -> OpenAiHttpProvider {
        OpenAiHttpProvider::new(OpenAiHttpConfig {
            provider_id: "openai".into(),
            api_key: "test-key".into(),
            api_base: base.into(),
            model: "gpt-4o-mini".into(),
        })
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello there!"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let response = provider.generate(&ModelRequest::new("Hi")).await.unwrap();

        assert_eq!(response.text, "Hello there!");
        assert_eq!(response.provider_id, "openai");
        assert_eq!(response.model_id, "gpt-4o-mini-2024");
    }

    #[tokio::test]
    async fn test_generate_api_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit exceeded"}
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&ModelRequest::new("Hi")).await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_generate_empty_choices_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "x", "choices": []})),
            )
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&ModelRequest::new("Hi")).await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_generate_network_error_is_unavailable() {
        // Nothing is listening on this port
        let provider = make_provider("http://127.0.0.1:1");
        let err = provider.generate(&ModelRequest::new("Hi")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_handled() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&format!("{}/", server.uri()));
        let response = provider.generate(&ModelRequest::new("Hi")).await.unwrap();
        assert_eq!(response.text, "ok");
    }
}
