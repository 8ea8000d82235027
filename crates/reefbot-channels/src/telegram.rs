//! Telegram adapter — Bot API long polling via `getUpdates`.
//!
//! Features:
//! - `getMe` credential probe on start (authentication vs. transient errors)
//! - update-ID cursor initialized on start so startup backlog is skipped
//! - mention-only filter for group/supergroup messages
//! - `sendChatAction=typing` acknowledgement before reply generation, with
//!   a typing heartbeat every 4 s while the reply is in flight

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use reefbot_core::types::channel_ids;
use reefbot_core::{EngineError, InboundMessage, OutboundMessage};

use crate::adapter::{ChannelAdapter, InboundHandler};

/// Default Bot API base URL.
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Typing heartbeat interval while a reply is in flight.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// One parsed `getUpdates` entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TelegramUpdate {
    pub update_id: i64,
    pub chat_id: String,
    pub chat_type: String,
    pub message_id: Option<i64>,
    pub text: String,
}

/// Accept a group message only when the bot is mentioned by `@username`.
pub(crate) fn is_mentioned(text: &str, bot_username: &str) -> bool {
    if bot_username.is_empty() {
        return false;
    }
    let needle = format!("@{}", bot_username.to_lowercase());
    text.to_lowercase().contains(&needle)
}

/// Extract message updates from a `getUpdates` response body.
pub(crate) fn parse_updates(body: &Value) -> Vec<TelegramUpdate> {
    let mut out = Vec::new();
    let Some(result) = body["result"].as_array() else {
        return out;
    };

    for update in result {
        let Some(update_id) = update["update_id"].as_i64() else {
            continue;
        };
        let message = &update["message"];
        let chat = &message["chat"];
        let Some(chat_id) = chat["id"].as_i64() else {
            continue;
        };

        out.push(TelegramUpdate {
            update_id,
            chat_id: chat_id.to_string(),
            chat_type: chat["type"].as_str().unwrap_or("private").to_string(),
            message_id: message["message_id"].as_i64(),
            text: message["text"].as_str().unwrap_or("").to_string(),
        });
    }
    out
}

struct TelegramInner {
    token: String,
    api_base: String,
    poll_interval_ms: u64,
    mention_only: bool,
    http: reqwest::Client,
    handler: RwLock<Option<InboundHandler>>,
    shutdown: Notify,
    running: AtomicBool,
    bot_username: RwLock<Option<String>>,
    offset: Mutex<i64>,
    typing_tasks: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
}

impl TelegramInner {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Classify the credential probe response.
    async fn get_me(&self) -> Result<String, EngineError> {
        let response = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram getMe: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::Authentication(format!(
                "telegram rejected bot token (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(EngineError::Unavailable(format!(
                "telegram getMe: HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram getMe: {e}")))?;
        Ok(body["result"]["username"].as_str().unwrap_or("").to_string())
    }

    /// Skip the startup backlog: point the cursor past the newest update.
    async fn init_cursor(&self) -> Result<(), EngineError> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", "-1"), ("timeout", "0")])
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram cursor init: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram cursor init: {e}")))?;

        if let Some(last) = parse_updates(&body).last() {
            *self.offset.lock().await = last.update_id + 1;
        }
        Ok(())
    }

    async fn poll_once(self: &Arc<Self>) -> Result<(), EngineError> {
        let offset = *self.offset.lock().await;
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string().as_str()), ("timeout", "0")])
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram getUpdates: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram getUpdates: {e}")))?;

        for update in parse_updates(&body) {
            *self.offset.lock().await = update.update_id + 1;
            self.handle_update(update).await;
        }
        Ok(())
    }

    async fn handle_update(self: &Arc<Self>, update: TelegramUpdate) {
        if update.text.trim().is_empty() {
            return;
        }

        let is_group = matches!(update.chat_type.as_str(), "group" | "supergroup");
        if is_group && self.mention_only {
            let username = self.bot_username.read().unwrap().clone().unwrap_or_default();
            if !is_mentioned(&update.text, &username) {
                debug!(chat = %update.chat_id, "group message without mention, ignoring");
                return;
            }
            // Lightweight acknowledgement before reply generation begins
            self.send_typing(&update.chat_id).await;
            self.start_typing_heartbeat(update.chat_id.clone()).await;
        }

        let handler = self.handler.read().unwrap().clone();
        let Some(handler) = handler else {
            warn!("telegram inbound dropped, no handler installed");
            return;
        };

        let mut inbound =
            InboundMessage::new(channel_ids::TELEGRAM, update.chat_id.clone(), update.text);
        inbound.account_id = None;
        handler(inbound).await;
    }

    async fn send_typing(&self, chat_id: &str) {
        let result = self
            .http
            .post(self.method_url("sendChatAction"))
            .json(&json!({"chat_id": chat_id, "action": "typing"}))
            .send()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "telegram sendChatAction failed");
        }
    }

    /// Re-issue the typing action every 4 s until the reply is sent.
    async fn start_typing_heartbeat(self: &Arc<Self>, chat_id: String) {
        let inner = Arc::clone(self);
        let chat = chat_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(TYPING_INTERVAL).await;
                inner.send_typing(&chat).await;
            }
        });

        let mut tasks = self.typing_tasks.lock().await;
        if let Some(old) = tasks.insert(chat_id, handle) {
            old.abort();
        }
    }

    async fn stop_typing_heartbeat(&self, chat_id: &str) {
        if let Some(handle) = self.typing_tasks.lock().await.remove(chat_id) {
            handle.abort();
        }
    }

    async fn abort_all_typing(&self) {
        for (_, handle) in self.typing_tasks.lock().await.drain() {
            handle.abort();
        }
    }
}

/// Telegram Bot API polling adapter.
pub struct TelegramAdapter {
    inner: Arc<TelegramInner>,
}

impl TelegramAdapter {
    pub fn new(token: String, poll_interval_ms: u64, mention_only: bool) -> Self {
        Self::with_api_base(token, poll_interval_ms, mention_only, DEFAULT_API_BASE)
    }

    /// Adapter against a custom API base (tests point this at a mock
    /// server).
    pub fn with_api_base(
        token: String,
        poll_interval_ms: u64,
        mention_only: bool,
        api_base: impl Into<String>,
    ) -> Self {
        TelegramAdapter {
            inner: Arc::new(TelegramInner {
                token,
                api_base: api_base.into(),
                poll_interval_ms: poll_interval_ms.max(1),
                mention_only,
                http: reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .expect("failed to create HTTP client"),
                handler: RwLock::new(None),
                shutdown: Notify::new(),
                running: AtomicBool::new(false),
                bot_username: RwLock::new(None),
                offset: Mutex::new(0),
                typing_tasks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn id(&self) -> &str {
        channel_ids::TELEGRAM
    }

    async fn start(&self) -> Result<(), EngineError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let username = match self.inner.get_me().await {
            Ok(username) => username,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.inner.bot_username.write().unwrap() = Some(username.clone());
        info!(bot = %username, "telegram adapter authenticated");

        if let Err(e) = self.inner.init_cursor().await {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            info!("telegram poll loop started");
            loop {
                tokio::select! {
                    _ = inner.shutdown.notified() => break,
                    _ = tokio::time::sleep(Duration::from_millis(inner.poll_interval_ms)) => {
                        if let Err(e) = inner.poll_once().await {
                            warn!(error = %e, "telegram poll failed");
                        }
                    }
                }
            }
            info!("telegram poll loop stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown.notify_waiters();
        self.inner.abort_all_typing().await;
        Ok(())
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.inner.handler.write().unwrap() = Some(handler);
    }

    async fn send(&self, outbound: &OutboundMessage) -> Result<(), EngineError> {
        self.inner.stop_typing_heartbeat(&outbound.peer_id).await;

        let response = self
            .inner
            .http
            .post(self.inner.method_url("sendMessage"))
            .json(&json!({"chat_id": outbound.peer_id, "text": outbound.text}))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("telegram sendMessage: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EngineError::Authentication(
                "telegram rejected bot token".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!(
                "telegram sendMessage: HTTP {status}: {body}"
            )));
        }
        Ok(())
    }
}
