//! Core message types flowing between channels and the engine.
//!
//! An [`InboundMessage`] is created by a channel adapter and lives for one
//! engine invocation; an [`OutboundMessage`] is created by the auto-reply
//! engine (or the host) and handed to the channel registry for delivery.
//! Both are plain value types — no subsystem hands out live references into
//! its own state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known channel identifiers.
///
/// The set is open for extension — adapters register under any non-colliding
/// ID — but these four are what the stock adapters use.
pub mod channel_ids {
    pub const DISCORD: &str = "discord";
    pub const TELEGRAM: &str = "telegram";
    pub const WHATSAPP: &str = "whatsapp";
    pub const WEBCHAT: &str = "webchat";
}

/// The `{channel, accountID?, peerID?}` triple observed on an inbound message.
///
/// Used for session-key derivation and route → agent resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
}

impl Route {
    /// Create a route with channel and peer set.
    pub fn new(channel: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Route {
            channel: channel.into(),
            account_id: None,
            peer_id: Some(peer_id.into()),
        }
    }

    /// Set the account ID.
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

/// A media attachment carried on an inbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    /// MIME type (e.g. "image/jpeg", "audio/ogg").
    pub mime_type: String,
    /// URL or local file path to the media.
    pub url: String,
    /// Optional filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// An inbound message from a channel to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    /// Channel ID (e.g. "telegram", "webchat").
    pub channel: String,
    /// Bot-side account identifier, when the channel is multi-account.
    pub account_id: Option<String>,
    /// Peer (chat/conversation) identifier within the channel.
    pub peer_id: String,
    /// Text content of the message.
    pub text: String,
    /// Attached media.
    pub attachments: Vec<MediaAttachment>,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a new inbound message with the minimal required fields.
    pub fn new(
        channel: impl Into<String>,
        peer_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            account_id: None,
            peer_id: peer_id.into(),
            text: text.into(),
            attachments: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Set the account ID.
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// The route this message was observed on.
    pub fn route(&self) -> Route {
        Route {
            channel: self.channel.clone(),
            account_id: self.account_id.clone(),
            peer_id: Some(self.peer_id.clone()),
        }
    }
}

/// An outbound message from the engine to a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    /// Target channel ID.
    pub channel: String,
    /// Bot-side account identifier, when the channel is multi-account.
    pub account_id: Option<String>,
    /// Target peer (chat/conversation) identifier.
    pub peer_id: String,
    /// Text content to send.
    pub text: String,
    /// Optional message ID to reply to.
    pub reply_to_id: Option<String>,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(
        channel: impl Into<String>,
        peer_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            account_id: None,
            peer_id: peer_id.into(),
            text: text.into(),
            reply_to_id: None,
        }
    }

    /// The reply counterpart of an inbound message.
    pub fn reply_to(inbound: &InboundMessage, text: impl Into<String>) -> Self {
        OutboundMessage {
            channel: inbound.channel.clone(),
            account_id: inbound.account_id.clone(),
            peer_id: inbound.peer_id.clone(),
            text: text.into(),
            reply_to_id: None,
        }
    }
}

/// Role of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
    System,
}

impl ConversationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationRole::User => "user",
            ConversationRole::Assistant => "assistant",
            ConversationRole::System => "system",
        }
    }
}

/// One retained turn of a conversation, keyed externally by session key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: ConversationRole,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    pub text: String,
    pub ts_ms: i64,
}
