//! CLI channel — interactive terminal-based chat.
//!
//! Reads user lines from stdin (or any buffered reader) and prints replies
//! to stdout. Used by `paperclaw chat`.

use async_trait::async_trait;
use paperclaw_core::channel::{Channel, ChannelId, ChannelMessage};
use paperclaw_core::error::ChannelError;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

pub const CHAT_ID: &str = "cli_session";

/// Lines that end the chat.
pub fn is_exit_command(line: &str) -> bool {
    matches!(line.trim(), "exit" | "quit" | "/exit" | "/quit" | ":q")
}

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
    input: Mutex<Option<LineSource>>,
}

impl CliChannel {
    /// A channel reading from stdin.
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    /// A channel reading lines from `reader`.
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            id: ChannelId("cli".into()),
            input: Mutex::new(Some(Box::new(reader))),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Blank lines are skipped; an exit command or EOF closes the receiver.
    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let reader = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::NotConfigured("CLI input already consumed".into()))?;

        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_command(&line) {
                            debug!("Exit command received");
                            break;
                        }

                        let msg = ChannelMessage {
                            channel_id: channel_id.clone(),
                            sender_id: "local_user".into(),
                            content: line,
                            chat_id: CHAT_ID.into(),
                        };

                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(channel: &CliChannel) -> Vec<String> {
        let mut rx = channel.start().await.unwrap();
        let mut lines = Vec::new();
        while let Some(msg) = rx.recv().await {
            lines.push(msg.unwrap().content);
        }
        lines
    }

    #[test]
    fn cli_channel_properties() {
        let ch = CliChannel::from_reader(&b""[..]);
        assert_eq!(ch.name(), "cli");
        assert_eq!(ch.id().0, "cli");
    }

    #[test]
    fn exit_commands() {
        for cmd in ["exit", "quit", "/exit", "/quit", ":q", "  exit  "] {
            assert!(is_exit_command(cmd), "{cmd}");
        }
        assert!(!is_exit_command("/clear"));
        assert!(!is_exit_command("exit the building"));
    }

    #[tokio::test]
    async fn reads_trimmed_lines_until_eof() {
        let ch = CliChannel::from_reader(&b"  Suggest a topic  \n\n/stats\n"[..]);
        assert_eq!(drain(&ch).await, vec!["Suggest a topic", "/stats"]);
    }

    #[tokio::test]
    async fn stops_at_exit_command() {
        let ch = CliChannel::from_reader(&b"first\nquit\nnever seen\n"[..]);
        let mut rx = ch.start().await.unwrap();
        let msg = rx.recv().await.unwrap().unwrap();
        assert_eq!(msg.content, "first");
        assert_eq!(msg.chat_id, CHAT_ID);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn start_consumes_the_input_once() {
        let ch = CliChannel::from_reader(&b"hello\n"[..]);
        let _rx = ch.start().await.unwrap();
        assert!(matches!(ch.start().await, Err(ChannelError::NotConfigured(_))));
    }
}
