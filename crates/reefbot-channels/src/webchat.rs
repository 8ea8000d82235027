//! Webchat adapter — the in-process channel.
//!
//! No transport: hosts (and tests) inject inbound messages directly and
//! collect delivered outbound messages with `sent_messages()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;

use reefbot_core::types::channel_ids;
use reefbot_core::{EngineError, InboundMessage, OutboundMessage};

use crate::adapter::{ChannelAdapter, InboundHandler};

/// In-process chat adapter.
#[derive(Default)]
pub struct WebchatAdapter {
    handler: RwLock<Option<InboundHandler>>,
    sent: Mutex<Vec<OutboundMessage>>,
    started: AtomicBool,
}

impl WebchatAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an inbound message through the installed handler, as a
    /// transport would.
    pub async fn inject_inbound(&self, message: InboundMessage) {
        let handler = self.handler.read().unwrap().clone();
        match handler {
            Some(handler) => handler(message).await,
            None => debug!("webchat inbound dropped, no handler installed"),
        }
    }

    /// Copy of every delivered outbound message.
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recently delivered outbound message.
    pub fn last_sent(&self) -> Option<OutboundMessage> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChannelAdapter for WebchatAdapter {
    fn id(&self) -> &str {
        channel_ids::WEBCHAT
    }

    async fn start(&self) -> Result<(), EngineError> {
        self.started.store(true, Ordering::SeqCst);
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
        self.sent.lock().unwrap().push(outbound.clone());
        Ok(())
    }
}
