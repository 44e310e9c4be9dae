//! The research agent: an orchestrator loop and the chat session that drives it.
//!
//! The agent follows a **stream → act → observe** cycle:
//!
//! 1. **Receive** the conversation (system prompt + history)
//! 2. **Stream** a reply from the configured provider, publishing snapshots
//! 3. **If tool calls**: run them, append the results, go back to step 2
//! 4. **If text only**: the run is over
//!
//! [`ChatSession`] consumes the snapshots and keeps the user-visible history.

pub mod loop_runner;
pub mod prompt;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, MAX_ITERATIONS_MESSAGE};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, system_prompt};
pub use session::{ChatSession, SessionStats, TurnOutcome, TurnView};
