//! Chat surfaces for PaperClaw.
//!
//! Each channel relays user lines to the chat session and prints replies.
//! The interactive terminal is the only one today.

pub mod cli;

pub use cli::{CliChannel, is_exit_command};
