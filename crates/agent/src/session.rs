//! Chat session — keeps the conversation and feeds turns to the orchestrator.
//!
//! A turn sends `[system prompt] + history` to the orchestrator and follows
//! its snapshots. The view is repainted with the tool log (one line per tool
//! invoked) followed by the assistant's latest text. Only the final
//! assistant text is kept in history; tool traffic stays inside the turn.

use std::collections::HashSet;

use paperclaw_core::message::{Conversation, Message, Role};
use paperclaw_core::orchestrator::{Orchestrator, RunConfig};
use tracing::{error, info};

pub const TOOL_LOG_PREFIX: &str = "🔧 Calling: ";
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// Where a turn is rendered while it streams.
pub trait TurnView {
    /// Replace the turn's display with `display`.
    fn show(&mut self, display: &str);

    /// Show a failure for the turn.
    fn show_error(&mut self, message: &str);
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        response: String,
        tools_called: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
}

pub struct ChatSession {
    conversation: Conversation,
    system_prompt: String,
    run_config: RunConfig,
    processing: bool,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let conversation = Conversation::new();
        let run_config = RunConfig::new(conversation.id.to_string());
        Self {
            conversation,
            system_prompt: system_prompt.into(),
            run_config,
            processing: false,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.run_config.max_iterations = max;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        info!(thread_id = %self.run_config.thread_id, "Chat history cleared");
    }

    pub fn stats(&self) -> SessionStats {
        let count = |role: Role| self.history().iter().filter(|m| m.role == role).count();
        SessionStats {
            messages: self.history().len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
        }
    }

    /// Run one user turn to completion.
    ///
    /// Failures are shown on `view` and returned as [`TurnOutcome::Failed`];
    /// the session stays usable either way.
    pub async fn submit(
        &mut self,
        input: &str,
        orchestrator: &dyn Orchestrator,
        view: &mut dyn TurnView,
    ) -> TurnOutcome {
        info!(thread_id = %self.run_config.thread_id, input = %input, "User input");
        self.conversation.push(Message::user(input));
        self.processing = true;

        let outcome = match self.follow_turn(orchestrator, view).await {
            Ok(turn) => {
                if !turn.response.is_empty() {
                    self.conversation.push(Message::assistant(turn.response.as_str()));
                    info!(thread_id = %self.run_config.thread_id, "Agent response added to history");
                }
                TurnOutcome::Completed {
                    response: turn.response,
                    tools_called: turn.tools_called,
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(thread_id = %self.run_config.thread_id, error = %message, "Agent error");
                view.show_error(&format!("{ERROR_PREFIX}{message}"));
                TurnOutcome::Failed { error: message }
            }
        };

        self.processing = false;
        outcome
    }

    async fn follow_turn(
        &self,
        orchestrator: &dyn Orchestrator,
        view: &mut dyn TurnView,
    ) -> Result<TurnState, paperclaw_core::Error> {
        let mut messages = Vec::with_capacity(self.history().len() + 1);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend(self.history().iter().cloned());

        let mut stream = orchestrator.stream(messages, &self.run_config).await?;
        let mut turn = TurnState::default();

        while let Some(snapshot) = stream.recv().await {
            let snapshot = snapshot?;
            let Some(message) = snapshot.last() else {
                continue;
            };
            if turn.observe(message) {
                view.show(&turn.display());
            }
        }

        Ok(turn)
    }
}

/// What a turn has shown so far.
#[derive(Debug, Default)]
struct TurnState {
    seen_calls: HashSet<String>,
    tool_log: Vec<String>,
    tools_called: Vec<String>,
    response: String,
}

impl TurnState {
    /// Fold in the latest message; returns whether the display changed.
    fn observe(&mut self, message: &Message) -> bool {
        let mut changed = false;

        for call in &message.tool_calls {
            if self.seen_calls.insert(call.id.clone()) {
                info!(tool = %call.name, "Tool call: {}", call.name);
                self.tool_log.push(format!("{TOOL_LOG_PREFIX}{}", call.name));
                self.tools_called.push(call.name.clone());
                changed = true;
            }
        }

        if message.role == Role::Assistant && !message.content.is_empty() {
            let text = message.text();
            if text != self.response {
                self.response = text.into_owned();
                changed = true;
            }
        }

        changed
    }

    fn display(&self) -> String {
        if self.tool_log.is_empty() {
            return self.response.clone();
        }
        format!("{}\n\n{}", self.tool_log.join("\n"), self.response)
    }
}
