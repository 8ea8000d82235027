//! Reefbot Channels — transport adapters and outbound routing.
//!
//! This crate provides:
//! - **adapter**: the [`ChannelAdapter`] trait every transport implements
//! - **registry**: [`ChannelRegistry`] — outbound routing with retry,
//!   backoff, per-channel throttling, and health snapshots
//! - **discord** / **telegram**: REST polling adapters with mention-only
//!   ingress filtering and typing acknowledgements
//! - **whatsapp**: WhatsApp Cloud API webhook adapter
//! - **webchat**: the in-process adapter used by hosts and tests

pub mod adapter;
pub mod discord;
pub mod registry;
pub mod telegram;
pub mod webchat;
pub mod whatsapp;

pub use adapter::{ChannelAdapter, InboundHandler};
pub use registry::{ChannelRegistry, ChannelStatus, HealthSnapshot, RetryPolicy, ThrottlePolicy};
pub use webchat::WebchatAdapter;
