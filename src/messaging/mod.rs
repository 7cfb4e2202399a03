//! Outbound Messaging Channel (spec.md §6)
//! Mission: One narrow contract the signal emitter talks to — a chat-bot UI sits behind a
//! real implementation of this trait, but building that UI is out of scope here.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub reply_markup: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub message_id: String,
}

/// Accepts `{text, reply_markup?}`, returns `Some(message_id)` on success or
/// `None` on a transient failure the caller should retry on the next tick
/// within the same cooldown window.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Option<SendResult>;
}

pub use http::WebhookChannel;
pub use mock::RecordingChannel;
