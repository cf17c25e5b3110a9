//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// An authenticated, decoded text message from an end user.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Name of the channel it arrived on.
    pub channel: String,
    /// Stable per-conversation identity on that channel.
    pub user_id: String,
    pub content: String,
    /// Channel-specific routing data (reply tokens, chat ids).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Key of the triage session this message belongs to.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.user_id)
    }
}

/// One reply for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages. May only be called once.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver the reply to `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
