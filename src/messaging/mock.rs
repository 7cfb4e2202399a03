//! In-memory recording channel for tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{MessagingChannel, OutboundMessage, SendResult};

#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_next_n: std::sync::atomic::AtomicU32,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_n(&self, n: u32) {
        self.fail_next_n.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn send(&self, message: OutboundMessage) -> Option<SendResult> {
        let remaining = self.fail_next_n.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_n.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return None;
        }
        self.sent.lock().push(message);
        Some(SendResult { message_id: uuid::Uuid::new_v4().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_messages() {
        let channel = RecordingChannel::new();
        let msg = OutboundMessage { text: "hello".to_string(), reply_markup: None };
        let result = channel.send(msg).await;
        assert!(result.is_some());
        assert_eq!(channel.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn fail_next_n_simulates_transient_failure() {
        let channel = RecordingChannel::new();
        channel.fail_next_n(1);
        let msg = OutboundMessage { text: "hello".to_string(), reply_markup: None };
        assert!(channel.send(msg.clone()).await.is_none());
        assert!(channel.send(msg).await.is_some());
    }
}
