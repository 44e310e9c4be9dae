//! Shared test helpers: scripted providers, orchestrators and tools.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use paperclaw_core::error::{Error, ProviderError, ToolError};
use paperclaw_core::message::{Message, MessageToolCall};
use paperclaw_core::orchestrator::{Orchestrator, RunConfig, Snapshot, SnapshotStream};
use paperclaw_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use paperclaw_core::tool::{Tool, ToolResult};

/// One scripted model turn.
pub enum Turn {
    /// Streamed text deltas followed by the listed tool calls.
    Reply {
        deltas: Vec<String>,
        tool_calls: Vec<MessageToolCall>,
    },
    /// The stream breaks after the given deltas.
    BreakAfter(Vec<String>, ProviderError),
    /// The request itself is rejected.
    Reject(ProviderError),
}

pub fn text_turn(deltas: &[&str]) -> Turn {
    Turn::Reply {
        deltas: deltas.iter().map(|d| d.to_string()).collect(),
        tool_calls: Vec::new(),
    }
}

pub fn tool_turn(thought: &str, tool_calls: Vec<MessageToolCall>) -> Turn {
    Turn::Reply {
        deltas: if thought.is_empty() {
            Vec::new()
        } else {
            vec![thought.to_string()]
        },
        tool_calls,
    }
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A provider that plays back a fixed sequence of streamed turns.
///
/// Panics if asked for more turns than were scripted.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("scripted provider only streams".into()))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more turns");

        let (deltas, ending) = match turn {
            Turn::Reject(err) => return Err(err),
            Turn::Reply { deltas, tool_calls } => (
                deltas,
                Ok(StreamChunk {
                    content: None,
                    tool_calls,
                    done: true,
                    usage: Some(Usage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    }),
                }),
            ),
            Turn::BreakAfter(deltas, err) => (deltas, Err(err)),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(deltas.len() + 1);
        for delta in deltas {
            tx.send(Ok(StreamChunk {
                content: Some(delta),
                tool_calls: Vec::new(),
                done: false,
                usage: None,
            }))
            .await
            .unwrap();
        }
        tx.send(ending).await.unwrap();
        Ok(rx)
    }
}

/// An orchestrator that replays fixed snapshots (or fails) without a model.
pub struct ReplayOrchestrator {
    items: Mutex<Option<Vec<Result<Vec<Message>, String>>>>,
}

impl ReplayOrchestrator {
    pub fn new(items: Vec<Result<Vec<Message>, String>>) -> Self {
        Self {
            items: Mutex::new(Some(items)),
        }
    }
}

#[async_trait]
impl Orchestrator for ReplayOrchestrator {
    async fn stream(&self, messages: Vec<Message>, _config: &RunConfig) -> Result<SnapshotStream, Error> {
        let items = self.items.lock().unwrap().take().unwrap_or_default();
        let (tx, stream) = SnapshotStream::channel(items.len().max(1));
        for item in items {
            let item = item
                .map(|tail| {
                    let mut all = messages.clone();
                    all.extend(tail);
                    Snapshot::new(all)
                })
                .map_err(Error::Internal);
            tx.send(item).await.unwrap();
        }
        Ok(stream)
    }
}

/// Echoes its `text` argument back; fails when asked to.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        if text == "fail" {
            return Err(ToolError::ExecutionFailed {
                tool_name: "echo".into(),
                reason: "asked to fail".into(),
            });
        }
        Ok(ToolResult::ok(text))
    }
}
