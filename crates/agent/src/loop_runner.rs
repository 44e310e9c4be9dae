//! The agent loop: stream a model turn, run the tools it asks for, repeat.
//!
//! Every change to the message list is published as a [`Snapshot`]:
//! each streamed text delta, each completed assistant message that carries
//! tool calls, and each tool result. The stream ends once the model answers
//! without tool calls, the iteration bound is hit, or the provider fails.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use paperclaw_config::AppConfig;
use paperclaw_core::error::Error;
use paperclaw_core::message::{Content, Message, MessageToolCall};
use paperclaw_core::orchestrator::{Orchestrator, RunConfig, Snapshot, SnapshotSender, SnapshotStream};
use paperclaw_core::provider::{Provider, ProviderRequest};
use paperclaw_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, info, warn};

/// Snapshot buffer between the loop task and its consumer.
const SNAPSHOT_BUFFER: usize = 64;

pub const MAX_ITERATIONS_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Tool-calling orchestrator over a streaming provider.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
        }
    }

    /// Model, temperature and token limit from the app config.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, &config.default_model, config.default_temperature, tools)
            .with_max_tokens(config.default_max_tokens)
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive one run to completion, publishing snapshots on `tx`.
    ///
    /// Returns early (quietly) once the consumer has gone away.
    async fn run(self, mut messages: Vec<Message>, config: RunConfig, tx: SnapshotSender) {
        let started = Instant::now();
        let tool_definitions = self.tools.definitions();

        info!(
            thread_id = %config.thread_id,
            model = %self.model,
            messages = messages.len(),
            "Starting agent run"
        );

        for iteration in 1..=config.max_iterations {
            debug!(thread_id = %config.thread_id, iteration, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
                stream: true,
            };

            let mut chunks = match self.provider.stream(request).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(thread_id = %config.thread_id, error = %e, "Provider request failed");
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            // One message per model turn; deltas grow its content in place.
            let mut reply = Message::assistant("");
            let mut text = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();

            while let Some(chunk) = chunks.recv().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(thread_id = %config.thread_id, error = %e, "Provider stream failed");
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                };

                if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                    text.push_str(&delta);
                    reply.content = Content::Text(text.clone());
                    if !publish(&tx, &messages, Some(&reply)).await {
                        return;
                    }
                }

                tool_calls.extend(chunk.tool_calls);
                if chunk.done {
                    break;
                }
            }

            if tool_calls.is_empty() {
                let streamed = !text.is_empty();
                messages.push(reply);
                // A reply with no text produced no snapshot yet.
                if !streamed {
                    publish(&tx, &messages, None).await;
                }
                info!(
                    thread_id = %config.thread_id,
                    iterations = iteration,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Agent run complete"
                );
                return;
            }

            debug!(
                thread_id = %config.thread_id,
                tool_count = tool_calls.len(),
                "Executing tool calls"
            );

            messages.push(reply.with_tool_calls(tool_calls.clone()));
            if !publish(&tx, &messages, None).await {
                return;
            }

            for tc in &tool_calls {
                let output = self.execute_tool(tc).await;
                messages.push(Message::tool_result(&tc.id, output));
                if !publish(&tx, &messages, None).await {
                    return;
                }
            }
        }

        warn!(
            thread_id = %config.thread_id,
            max_iterations = config.max_iterations,
            "Max tool iterations reached"
        );
        messages.push(Message::assistant(MAX_ITERATIONS_MESSAGE));
        publish(&tx, &messages, None).await;
    }

    /// Run one tool call. Failures become `Error: ...` text for the model.
    async fn execute_tool(&self, tc: &MessageToolCall) -> String {
        let arguments = match parse_arguments(&tc.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %tc.name, error = %e, "Tool arguments are not valid JSON");
                return format!("Error: invalid arguments for {}: {e}", tc.name);
            }
        };

        let call = ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments,
        };

        let start = Instant::now();
        let result = self.tools.execute(&call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                info!(tool = %tc.name, success = result.success, duration_ms, "Tool executed");
                result.output
            }
            Err(e) => {
                warn!(tool = %tc.name, error = %e, duration_ms, "Tool execution failed");
                format!("Error: {e}")
            }
        }
    }
}

/// Empty argument strings are treated as `{}`.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
}

/// Send `messages` (plus an optional in-progress message) as a snapshot.
///
/// Returns `false` once the consumer has dropped or closed the stream.
async fn publish(tx: &SnapshotSender, messages: &[Message], pending: Option<&Message>) -> bool {
    let mut snapshot = messages.to_vec();
    snapshot.extend(pending.cloned());
    if tx.send(Ok(Snapshot::new(snapshot))).await.is_err() {
        debug!("Snapshot consumer went away; stopping run");
        return false;
    }
    true
}

#[async_trait]
impl Orchestrator for AgentLoop {
    async fn stream(&self, messages: Vec<Message>, config: &RunConfig) -> Result<SnapshotStream, Error> {
        if config.max_iterations == 0 {
            return Err(Error::Config {
                message: "max_iterations must be greater than 0".into(),
            });
        }

        let (tx, stream) = SnapshotStream::channel(SNAPSHOT_BUFFER);
        tokio::spawn(self.clone().run(messages, config.clone(), tx));
        Ok(stream)
    }
}
