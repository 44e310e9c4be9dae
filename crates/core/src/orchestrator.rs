//! Orchestrator trait — the conversation graph seen from the chat surface.
//!
//! An orchestrator takes the full message list for a turn and streams back
//! snapshots of the evolving list: partial assistant text, assistant
//! messages carrying tool calls, tool results, and finally the answer.
//! Consumers read the last message of each snapshot.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;
use crate::message::Message;

/// Per-run settings passed alongside the messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Identifies the conversation thread (used for log correlation).
    pub thread_id: String,

    /// Upper bound on model round-trips in one run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    25
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_iterations: default_max_iterations(),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }
}

/// The full message list at one point of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub messages: Vec<Message>,
}

impl Snapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// The most recent message, which is what chat surfaces render.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Producer half of a [`SnapshotStream`].
pub type SnapshotSender = mpsc::Sender<Result<Snapshot, Error>>;

/// Ordered stream of snapshots for one run.
///
/// Ends after the final snapshot, or after a single `Err` item. Dropping the
/// stream (or calling [`SnapshotStream::close`]) makes the producer's next
/// send fail, which is its signal to stop work.
pub struct SnapshotStream {
    inner: ReceiverStream<Result<Snapshot, Error>>,
}

impl SnapshotStream {
    /// Create a connected sender/stream pair.
    pub fn channel(buffer: usize) -> (SnapshotSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                inner: ReceiverStream::new(rx),
            },
        )
    }

    /// Receive the next item, or `None` once the run is over.
    pub async fn recv(&mut self) -> Option<Result<Snapshot, Error>> {
        use tokio_stream::StreamExt;
        self.inner.next().await
    }

    /// Stop accepting snapshots. Already-buffered items can still be read.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Stream for SnapshotStream {
    type Item = Result<Snapshot, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The conversation graph.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Start a run over `messages` (system prompt first, then the history).
    async fn stream(&self, messages: Vec<Message>, config: &RunConfig) -> Result<SnapshotStream, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshots_arrive_in_order() {
        let (tx, mut stream) = SnapshotStream::channel(4);
        tx.send(Ok(Snapshot::new(vec![Message::user("a")]))).await.unwrap();
        tx.send(Ok(Snapshot::new(vec![Message::user("a"), Message::assistant("b")])))
            .await
            .unwrap();
        drop(tx);

        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first.last().unwrap().text(), "a");
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.last().unwrap().text(), "b");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn closing_the_stream_stops_the_producer() {
        let (tx, mut stream) = SnapshotStream::channel(4);
        stream.close();
        let result = tx.send(Ok(Snapshot::new(vec![]))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dropping_the_stream_closes_the_sender() {
        let (tx, stream) = SnapshotStream::channel(1);
        drop(stream);
        assert!(tx.is_closed());
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::new("thread-1");
        assert_eq!(config.max_iterations, 25);
        assert_eq!(config.with_max_iterations(3).max_iterations, 3);

        let parsed: RunConfig = serde_json::from_str(r#"{"thread_id":"t"}"#).unwrap();
        assert_eq!(parsed.max_iterations, 25);
    }
}
