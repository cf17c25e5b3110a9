//! ChannelManager. Merges inbound streams and routes replies by channel name.

use futures::stream::{self, StreamExt};

use crate::error::ChannelError;

use super::channel::{Channel, IncomingMessage, MessageStream, OutgoingResponse};

#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start every channel and merge their messages into one stream.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            streams.push(channel.start().await?);
            tracing::info!(channel = channel.name(), "Channel started");
        }
        Ok(stream::select_all(streams).boxed())
    }

    /// Send `response` back on the channel `msg` arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name() == msg.channel)
            .ok_or_else(|| ChannelError::UnknownChannel(msg.channel.clone()))?;
        channel.respond(msg, response).await
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Emits a fixed list of messages and records replies.
    struct ScriptedChannel {
        name: &'static str,
        inputs: Mutex<Option<Vec<&'static str>>>,
        replies: std::sync::Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let inputs = self.inputs.lock().unwrap().take().ok_or_else(|| {
                ChannelError::StartupFailed {
                    name: self.name.to_string(),
                    reason: "start() already called".to_string(),
                }
            })?;
            let name = self.name;
            let messages: Vec<IncomingMessage> = inputs
                .into_iter()
                .map(|text| IncomingMessage::new(name, "u", text))
                .collect();
            Ok(stream::iter(messages).boxed())
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.replies.lock().unwrap().push(response.content);
            Ok(())
        }
    }

    fn scripted(
        name: &'static str,
        inputs: Vec<&'static str>,
    ) -> (Box<dyn Channel>, std::sync::Arc<Mutex<Vec<String>>>) {
        let replies = std::sync::Arc::new(Mutex::new(Vec::new()));
        let channel = ScriptedChannel {
            name,
            inputs: Mutex::new(Some(inputs)),
            replies: std::sync::Arc::clone(&replies),
        };
        (Box::new(channel), replies)
    }

    #[tokio::test]
    async fn merges_streams_and_routes_replies() {
        let (a, a_replies) = scripted("a", vec!["1", "2"]);
        let (b, b_replies) = scripted("b", vec!["3"]);
        let mut manager = ChannelManager::new();
        manager.add(a);
        manager.add(b);
        assert_eq!(manager.names(), ["a", "b"]);

        let messages: Vec<IncomingMessage> = manager.start_all().await.unwrap().collect().await;
        assert_eq!(messages.len(), 3);

        for msg in &messages {
            manager
                .respond(msg, OutgoingResponse::text(format!("re:{}", msg.content)))
                .await
                .unwrap();
        }
        assert_eq!(a_replies.lock().unwrap().len(), 2);
        assert_eq!(*b_replies.lock().unwrap(), ["re:3"]);
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let manager = ChannelManager::new();
        let msg = IncomingMessage::new("nowhere", "u", "hi");
        let err = manager.respond(&msg, OutgoingResponse::text("x")).await.unwrap_err();
        assert!(matches!(err, ChannelError::UnknownChannel(ref n) if n == "nowhere"));
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let (a, _) = scripted("a", vec![]);
        let mut manager = ChannelManager::new();
        manager.add(a);
        assert!(manager.start_all().await.is_ok());
        assert!(manager.start_all().await.is_err());
    }
}
