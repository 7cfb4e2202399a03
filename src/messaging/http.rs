//! HTTP webhook implementation of the messaging channel.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::{MessagingChannel, OutboundMessage, SendResult};

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    message_id: String,
}

/// Posts `{text, reply_markup}` as JSON to a configured webhook URL. A
/// single attempt per call — retrying belongs to the caller's cooldown-gated
/// loop, not to the channel itself, per the outbound messaging contract.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .expect("reqwest client builds with valid timeouts");
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl MessagingChannel for WebhookChannel {
    async fn send(&self, message: OutboundMessage) -> Option<SendResult> {
        let response = match self.client.post(&self.url).json(&message).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "webhook send failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "webhook returned non-success status");
            return None;
        }

        match response.json::<WebhookResponse>().await {
            Ok(body) => Some(SendResult { message_id: body.message_id }),
            Err(e) => {
                warn!(error = %e, "webhook response body did not parse");
                None
            }
        }
    }
}
