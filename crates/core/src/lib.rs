//! # PaperClaw Core
//!
//! Domain types, traits, and error definitions for the PaperClaw research agent.
//! This crate does no I/O. It defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - `Provider` — LLM backends (`paperclaw-providers`)
//! - `Tool` — agent capabilities, notably the LaTeX renderer (`paperclaw-tools`)
//! - `Orchestrator` — the conversation graph that streams snapshots (`paperclaw-agent`)
//! - `Channel` — chat surfaces (`paperclaw-channels`)

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod orchestrator;

// Re-export key types at crate root for ergonomics
pub use error::{Error, RenderError, RenderErrorKind, Result};
pub use message::{Content, ContentBlock, Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use channel::{Channel, ChannelMessage, ChannelId};
pub use tool::{Tool, ToolCall, ToolResult, ToolRegistry};
pub use orchestrator::{Orchestrator, RunConfig, Snapshot, SnapshotStream};
