//! Discord adapter — REST API polling.
//!
//! Polls configured guild channels for new messages over the REST API,
//! keyed by a per-channel last-message-ID cursor initialized on start so
//! the startup backlog is skipped.
//!
//! Features:
//! - `/users/@me` credential probe on start (authentication vs. transient)
//! - mention-only filter: `<@id>`, `<@!id>`, or `@username`
//! - 👀 reaction acknowledgement before reply generation begins
//! - typing heartbeat every 4 s while a reply is in flight
//! - optional presence client gating adapter health: `start()` must
//!   succeed before the adapter is up, `stop()` runs on every exit path

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

/// Discord REST API base URL.
const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Typing heartbeat interval while a reply is in flight.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// URL-encoded 👀 emoji for the reaction acknowledgement.
const EYES_REACTION: &str = "%F0%9F%91%80";

/// Presence-side companion of the adapter. `start()` must succeed before
/// the adapter reports itself up; `stop()` runs on every exit path,
/// including failures after presence has started.
#[async_trait]
pub trait PresenceClient: Send + Sync {
    async fn start(&self) -> Result<(), EngineError>;
    async fn stop(&self);
}

/// One polled Discord message.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

/// Accept a message only when the bot is mentioned by ID or `@username`.
pub(crate) fn is_mentioned(content: &str, self_id: &str, username: &str) -> bool {
    if !self_id.is_empty()
        && (content.contains(&format!("<@{self_id}>"))
            || content.contains(&format!("<@!{self_id}>")))
    {
        return true;
    }
    if !username.is_empty() {
        let needle = format!("@{}", username.to_lowercase());
        if content.to_lowercase().contains(&needle) {
            return true;
        }
    }
    false
}

/// Parse a channel-messages response (newest first on the wire) into
/// ascending-ID order.
pub(crate) fn parse_messages(body: &Value) -> Vec<DiscordMessage> {
    let mut out: Vec<DiscordMessage> = body
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    Some(DiscordMessage {
                        id: m["id"].as_str()?.to_string(),
                        channel_id: m["channel_id"].as_str().unwrap_or("").to_string(),
                        author_id: m["author"]["id"].as_str().unwrap_or("").to_string(),
                        content: m["content"].as_str().unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    out.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));
    out
}

struct DiscordInner {
    token: String,
    api_base: String,
    channel_ids: Vec<String>,
    poll_interval_ms: u64,
    mention_only: bool,
    presence: Option<Arc<dyn PresenceClient>>,
    http: reqwest::Client,
    handler: RwLock<Option<InboundHandler>>,
    shutdown: Notify,
    running: AtomicBool,
    self_user: RwLock<Option<(String, String)>>,
    cursors: Mutex<HashMap<String, String>>,
    typing_tasks: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
}

impl DiscordInner {
    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn probe_identity(&self) -> Result<(String, String), EngineError> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("discord identity probe: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EngineError::Authentication(
                "discord rejected bot token".into(),
            ));
        }
        if !status.is_success() {
            return Err(EngineError::Unavailable(format!(
                "discord identity probe: HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("discord identity probe: {e}")))?;
        Ok((
            body["id"].as_str().unwrap_or("").to_string(),
            body["username"].as_str().unwrap_or("").to_string(),
        ))
    }

    /// Initialize each channel cursor to the newest message ID.
    async fn init_cursors(&self) -> Result<(), EngineError> {
        for channel_id in &self.channel_ids {
            let response = self
                .http
                .get(format!("{}/channels/{channel_id}/messages", self.api_base))
                .header("Authorization", self.auth_header())
                .query(&[("limit", "1")])
                .send()
                .await
                .map_err(|e| EngineError::Unavailable(format!("discord cursor init: {e}")))?;

            if !response.status().is_success() {
                return Err(EngineError::Unavailable(format!(
                    "discord cursor init for {channel_id}: HTTP {}",
                    response.status()
                )));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| EngineError::Unavailable(format!("discord cursor init: {e}")))?;
            if let Some(newest) = parse_messages(&body).last() {
                self.cursors
                    .lock()
                    .await
                    .insert(channel_id.clone(), newest.id.clone());
            }
        }
        Ok(())
    }

    async fn poll_once(self: &Arc<Self>) -> Result<(), EngineError> {
        for channel_id in &self.channel_ids {
            let after = self.cursors.lock().await.get(channel_id).cloned();

            let mut request = self
                .http
                .get(format!("{}/channels/{channel_id}/messages", self.api_base))
                .header("Authorization", self.auth_header())
                .query(&[("limit", "50")]);
            if let Some(after) = &after {
                request = request.query(&[("after", after.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| EngineError::Unavailable(format!("discord poll: {e}")))?;
            if !response.status().is_success() {
                return Err(EngineError::Unavailable(format!(
                    "discord poll for {channel_id}: HTTP {}",
                    response.status()
                )));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| EngineError::Unavailable(format!("discord poll: {e}")))?;

            for message in parse_messages(&body) {
                self.cursors
                    .lock()
                    .await
                    .insert(channel_id.clone(), message.id.clone());
                self.handle_message(message).await;
            }
        }
        Ok(())
    }

    async fn handle_message(self: &Arc<Self>, message: DiscordMessage) {
        if message.content.trim().is_empty() {
            return;
        }

        let (self_id, username) = self
            .self_user
            .read()
            .unwrap()
            .clone()
            .unwrap_or_default();
        if message.author_id == self_id {
            return;
        }

        if self.mention_only {
            if !is_mentioned(&message.content, &self_id, &username) {
                debug!(channel = %message.channel_id, "guild message without mention, ignoring");
                return;
            }
            // Acknowledge before reply generation begins
            self.add_eyes_reaction(&message.channel_id, &message.id).await;
            self.start_typing_heartbeat(message.channel_id.clone()).await;
        }

        let handler = self.handler.read().unwrap().clone();
        let Some(handler) = handler else {
            warn!("discord inbound dropped, no handler installed");
            return;
        };

        let inbound = InboundMessage::new(
            channel_ids::DISCORD,
            message.channel_id.clone(),
            message.content,
        );
        handler(inbound).await;
    }

    async fn add_eyes_reaction(&self, channel_id: &str, message_id: &str) {
        let url = format!(
            "{}/channels/{channel_id}/messages/{message_id}/reactions/{EYES_REACTION}/@me",
            self.api_base
        );
        let result = self
            .http
            .put(url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "discord reaction ack failed");
        }
    }

    async fn send_typing(&self, channel_id: &str) {
        let result = self
            .http
            .post(format!("{}/channels/{channel_id}/typing", self.api_base))
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "discord typing failed");
        }
    }

    async fn start_typing_heartbeat(self: &Arc<Self>, channel_id: String) {
        let inner = Arc::clone(self);
        let channel = channel_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                inner.send_typing(&channel).await;
                tokio::time::sleep(TYPING_INTERVAL).await;
            }
        });

        let mut tasks = self.typing_tasks.lock().await;
        if let Some(old) = tasks.insert(channel_id, handle) {
            old.abort();
        }
    }

    async fn stop_typing_heartbeat(&self, channel_id: &str) {
        if let Some(handle) = self.typing_tasks.lock().await.remove(channel_id) {
            handle.abort();
        }
    }

    async fn abort_all_typing(&self) {
        for (_, handle) in self.typing_tasks.lock().await.drain() {
            handle.abort();
        }
    }

    async fn stop_presence(&self) {
        if let Some(presence) = &self.presence {
            presence.stop().await;
        }
    }
}

/// Discord REST polling adapter.
pub struct DiscordAdapter {
    inner: Arc<DiscordInner>,
}

impl DiscordAdapter {
    pub fn new(
        token: String,
        channel_ids: Vec<String>,
        poll_interval_ms: u64,
        mention_only: bool,
    ) -> Self {
        Self::with_api_base(
            token,
            channel_ids,
            poll_interval_ms,
            mention_only,
            DEFAULT_API_BASE,
        )
    }

    /// Adapter against a custom API base (tests point this at a mock
    /// server).
    pub fn with_api_base(
        token: String,
        channel_ids: Vec<String>,
        poll_interval_ms: u64,
        mention_only: bool,
        api_base: impl Into<String>,
    ) -> Self {
        DiscordAdapter {
            inner: Arc::new(DiscordInner {
                token,
                api_base: api_base.into(),
                channel_ids,
                poll_interval_ms: poll_interval_ms.max(1),
                mention_only,
                presence: None,
                http: reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .expect("failed to create HTTP client"),
                handler: RwLock::new(None),
                shutdown: Notify::new(),
                running: AtomicBool::new(false),
                self_user: RwLock::new(None),
                cursors: Mutex::new(HashMap::new()),
                typing_tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Install a presence client. Its `start()` gates adapter startup.
    pub fn with_presence(mut self, presence: Arc<dyn PresenceClient>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_presence must be called before the adapter is shared");
        inner.presence = Some(presence);
        self
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    fn id(&self) -> &str {
        channel_ids::DISCORD
    }

    async fn start(&self) -> Result<(), EngineError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let identity = match self.inner.probe_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        info!(bot = %identity.1, "discord adapter authenticated");
        *self.inner.self_user.write().unwrap() = Some(identity);

        // Presence must be up before the adapter is; a presence that
        // started but whose sibling steps fail must still be stopped.
        if let Some(presence) = &self.inner.presence {
            if let Err(e) = presence.start().await {
                presence.stop().await;
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        if let Err(e) = self.inner.init_cursors().await {
            self.inner.stop_presence().await;
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            info!("discord poll loop started");
            loop {
                tokio::select! {
                    _ = inner.shutdown.notified() => break,
                    _ = tokio::time::sleep(Duration::from_millis(inner.poll_interval_ms)) => {
                        if let Err(e) = inner.poll_once().await {
                            warn!(error = %e, "discord poll failed");
                        }
                    }
                }
            }
            inner.stop_presence().await;
            info!("discord poll loop stopped");
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
            .post(format!(
                "{}/channels/{}/messages",
                self.inner.api_base, outbound.peer_id
            ))
            .header("Authorization", self.inner.auth_header())
            .json(&json!({"content": outbound.text}))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("discord send: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EngineError::Authentication(
                "discord rejected bot token".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!(
                "discord send: HTTP {status}: {body}"
            )));
        }
        Ok(())
    }
}
