//! Channel adapter trait — the abstract interface every transport
//! implements.
//!
//! Each adapter (Discord, Telegram, WhatsApp Cloud, webchat) owns its
//! transport connection and translates wire payloads into
//! [`InboundMessage`]s handed to the installed inbound handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use reefbot_core::{EngineError, InboundMessage, OutboundMessage};

/// Async callback invoked for each accepted inbound message.
pub type InboundHandler = Arc<
    dyn Fn(InboundMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Every transport implements this trait.
///
/// The [`ChannelRegistry`](crate::registry::ChannelRegistry) holds
/// `Arc<dyn ChannelAdapter>` and owns delivery policy (retry, throttle,
/// health); adapters only talk to their transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel ID (e.g. "telegram"). Must match
    /// `OutboundMessage.channel`.
    fn id(&self) -> &str;

    /// Start ingress. Idempotent. Must verify credentials before returning
    /// and fail with [`EngineError::Authentication`] when the transport
    /// rejects them, as opposed to [`EngineError::Unavailable`] for
    /// transient faults.
    async fn start(&self) -> Result<(), EngineError>;

    /// Stop ingress. Idempotent; releases background workers and closes
    /// outstanding waits.
    async fn stop(&self) -> Result<(), EngineError>;

    /// Install the async handler invoked for each accepted inbound.
    fn set_inbound_handler(&self, handler: InboundHandler);

    /// Deliver one outbound message. Returns once the transport accepts or
    /// rejects; the registry owns retries.
    async fn send(&self, outbound: &OutboundMessage) -> Result<(), EngineError>;
}

/// Wrap an async closure into an [`InboundHandler`].
pub fn inbound_handler<F, Fut>(f: F) -> InboundHandler
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}
