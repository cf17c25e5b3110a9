//! Dispatch loop: channel stream → triage engine → channel reply.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::error::Error;
use crate::triage::TriageEngine;

/// Routes every inbound message through the triage engine.
pub struct Agent {
    engine: Arc<TriageEngine>,
    channels: Arc<ChannelManager>,
    talking_enabled: bool,
}

impl Agent {
    pub fn new(engine: Arc<TriageEngine>, channels: ChannelManager, talking_enabled: bool) -> Self {
        Self {
            engine,
            channels: Arc::new(channels),
            talking_enabled,
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    ///
    /// Each message is handled on its own task, so a slow fallback call never
    /// holds up other conversations. Within one session, a task first waits
    /// for the previous message's task, so replies follow arrival order.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = self.channels.start_all().await?;
        let mut tails: HashMap<String, JoinHandle<()>> = HashMap::new();

        tracing::info!(
            channels = ?self.channels.names(),
            talking = self.talking_enabled,
            "Triage agent ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if !self.talking_enabled {
                tracing::info!(
                    channel = %message.channel,
                    user = %message.user_id,
                    "Talking disabled; message dropped"
                );
                continue;
            }

            tails.retain(|_, task| !task.is_finished());

            let engine = Arc::clone(&self.engine);
            let channels = Arc::clone(&self.channels);
            let session = message.session_key();
            let previous = tails.remove(&session);
            let task = tokio::spawn(async move {
                if let Some(previous) = previous {
                    // A panicked predecessor must not stall the conversation.
                    let _ = previous.await;
                }
                dispatch(&engine, &channels, message).await;
            });
            tails.insert(session, task);
        }

        self.channels.shutdown_all().await;
        Ok(())
    }
}

async fn dispatch(engine: &TriageEngine, channels: &ChannelManager, message: IncomingMessage) {
    let session = message.session_key();
    let reply = engine.handle_inbound(&session, &message.content).await;

    if let Err(e) = channels
        .respond(&message, OutgoingResponse::text(reply))
        .await
    {
        // Delivery is at-most-once; a failed reply is not retried.
        tracing::warn!(session = %session, error = %e, "Failed to deliver reply");
    }
}
