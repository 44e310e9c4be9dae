//! LLM provider implementations for PaperClaw.
//!
//! Every backend is reached through the OpenAI-compatible chat-completions
//! API. The router picks the configured one.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
