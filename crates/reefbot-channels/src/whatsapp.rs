//! WhatsApp Cloud API adapter — webhook ingress, Graph API send.
//!
//! No polling: Meta pushes events to the host's webhook endpoint, which
//! forwards them here. The adapter owns verification-handshake matching
//! and payload extraction; HTTP serving is the host's concern.
//!
//! Inbound messages live at `entry[*].changes[*].value.messages[*]` in the
//! webhook payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use reefbot_core::types::channel_ids;
use reefbot_core::{EngineError, InboundMessage, OutboundMessage};

use crate::adapter::{ChannelAdapter, InboundHandler};

/// Default Graph API base URL.
const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Extract inbound text messages from a webhook payload.
pub(crate) fn extract_messages(payload: &Value) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    let Some(entries) = payload["entry"].as_array() else {
        return out;
    };

    for entry in entries {
        let Some(changes) = entry["changes"].as_array() else {
            continue;
        };
        for change in changes {
            let Some(messages) = change["value"]["messages"].as_array() else {
                continue;
            };
            for message in messages {
                let from = message["from"].as_str().unwrap_or("");
                let id = message["id"].as_str().unwrap_or("");
                let text = message["text"]["body"].as_str().unwrap_or("");
                if !from.is_empty() && !text.is_empty() {
                    out.push((from.to_string(), id.to_string(), text.to_string()));
                }
            }
        }
    }
    out
}

/// WhatsApp Cloud API adapter.
pub struct WhatsAppCloudAdapter {
    access_token: String,
    phone_number_id: String,
    verify_token: String,
    api_base: String,
    http: reqwest::Client,
    handler: RwLock<Option<InboundHandler>>,
    started: AtomicBool,
}

impl WhatsAppCloudAdapter {
    pub fn new(access_token: String, phone_number_id: String, verify_token: String) -> Self {
        Self::with_api_base(access_token, phone_number_id, verify_token, DEFAULT_API_BASE)
    }

    /// Adapter against a custom Graph API base (tests point this at a mock
    /// server).
    pub fn with_api_base(
        access_token: String,
        phone_number_id: String,
        verify_token: String,
        api_base: impl Into<String>,
    ) -> Self {
        WhatsAppCloudAdapter {
            access_token,
            phone_number_id,
            verify_token,
            api_base: api_base.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
            handler: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Webhook verification handshake. Returns the challenge to echo when
    /// `mode == "subscribe"` and the token matches, `None` otherwise.
    pub fn handle_webhook_verification(
        &self,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Option<String> {
        if mode == "subscribe" && token == self.verify_token {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    /// Parse a webhook event body and feed each inbound message through
    /// the installed handler.
    pub async fn handle_webhook_event(&self, raw: &str) -> Result<(), EngineError> {
        let payload: Value = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidConfiguration(format!("webhook payload: {e}")))?;

        let handler = self.handler.read().unwrap().clone();
        let Some(handler) = handler else {
            warn!("whatsapp inbound dropped, no handler installed");
            return Ok(());
        };

        for (from, message_id, text) in extract_messages(&payload) {
            debug!(from = %from, message_id = %message_id, "whatsapp webhook message");
            let inbound = InboundMessage::new(channel_ids::WHATSAPP, from, text);
            handler(inbound).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppCloudAdapter {
    fn id(&self) -> &str {
        channel_ids::WHATSAPP
    }

    async fn start(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Credential probe against the phone-number resource
        let response = self
            .http
            .get(format!("{}/{}", self.api_base, self.phone_number_id))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .send()
            .await
            .map_err(|e| {
                self.started.store(false, Ordering::SeqCst);
                EngineError::Unavailable(format!("whatsapp credential probe: {e}"))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.started.store(false, Ordering::SeqCst);
            return Err(EngineError::Authentication(
                "whatsapp rejected access token".into(),
            ));
        }
        if !status.is_success() {
            self.started.store(false, Ordering::SeqCst);
            return Err(EngineError::Unavailable(format!(
                "whatsapp credential probe: HTTP {status}"
            )));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.handler.write().unwrap() = Some(handler);
    }

    async fn send(&self, outbound: &OutboundMessage) -> Result<(), EngineError> {
        let response = self
            .http
            .post(format!(
                "{}/{}/messages",
                self.api_base, self.phone_number_id
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": outbound.peer_id,
                "text": {"body": outbound.text},
            }))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("whatsapp send: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EngineError::Authentication(
                "whatsapp rejected access token".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!(
                "whatsapp send: HTTP {status}: {body}"
            )));
        }
        Ok(())
    }
}
