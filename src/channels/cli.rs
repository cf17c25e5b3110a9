//! CLI channel. Stdin/stdout REPL for trying the triage flow locally.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::taxonomy::BYPASS_TOKEN;
use crate::triage::state::RESTART_TOKEN;

const CHANNEL_NAME: &str = "cli";

/// Every line typed at the terminal belongs to this one conversation.
pub const CLI_USER: &str = "local-user";

/// Reads lines from stdin and prints replies to stdout.
#[derive(Debug, Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Turn each non-blank line of `reader` into a message from [`CLI_USER`].
/// The stream ends at EOF or on the first read error.
fn line_messages<R>(reader: R) -> MessageStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let msg = IncomingMessage::new(CHANNEL_NAME, CLI_USER, line.trim());
                    return Some((msg, lines));
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(error = %e, "Error reading stdin");
                    return None;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        eprintln!(
            "Type a category letter to begin, {BYPASS_TOKEN} to ask freely, {RESTART_TOKEN} to start over."
        );
        eprint!("> ");
        Ok(line_messages(BufReader::new(tokio::io::stdin())))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let input: &'static [u8] = "A\n\n   \n感冒\n".as_bytes();
        let messages: Vec<IncomingMessage> = line_messages(input).collect().await;

        let texts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["A", "感冒"]);
    }

    #[tokio::test]
    async fn every_line_shares_one_session() {
        let input: &'static [u8] = b"A\nB\n";
        let messages: Vec<IncomingMessage> = line_messages(input).collect().await;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].session_key(), messages[1].session_key());
        assert_eq!(messages[0].session_key(), format!("cli:{CLI_USER}"));
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[tokio::test]
    async fn stream_ends_at_eof() {
        let input: &'static [u8] = b"";
        let mut messages = line_messages(input);
        assert!(messages.next().await.is_none());
    }
}
