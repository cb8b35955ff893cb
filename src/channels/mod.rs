//! Messaging platform: outbound delivery and the inbound webhook.
//!
//! The conversation core only sees two seams:
//!
//! ```text
//!   POST /webhook ──▶ parse ──▶ InboundEvent ──▶ EventHandler
//!                                                     │
//!   Messenger Send API ◀── MessengerClient ◀── Messenger::deliver
//! ```

pub mod messenger;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;

pub use messenger::MessengerClient;
pub use webhook::{EventHandler, EventKind, InboundEvent, WebhookState, parse_events, webhook_routes};

/// A button shown under a message. Tapping it sends `payload` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickReply {
    pub title: String,
    pub payload: String,
}

impl QuickReply {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to the user, with optional quick-reply buttons.
    async fn deliver(
        &self,
        external_id: &str,
        text: &str,
        quick_replies: &[QuickReply],
    ) -> Result<(), ChannelError>;
}
