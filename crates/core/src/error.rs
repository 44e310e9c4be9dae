//! Error types for the PaperClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all PaperClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Failure of a single LaTeX render job.
///
/// The first four variants are the render taxonomy surfaced to callers.
/// `Workspace` covers the filesystem preparation that happens before the
/// engine is ever launched.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch typesetting engine '{engine}': {source}")]
    Invocation {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine} failed (exit {}): {}", exit_label(.exit_code), diagnostic_text(.stdout, .stderr))]
    Compilation {
        engine: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("PDF not generated at {}; output directory contains: [{}]", .expected.display(), .found.join(", "))]
    Verification { expected: PathBuf, found: Vec<String> },

    #[error("{engine} did not finish within {timeout:?} and was terminated")]
    Timeout { engine: String, timeout: Duration },

    #[error("failed to prepare {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Discriminant of [`RenderError`], for callers that branch on the failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    Invocation,
    Compilation,
    Verification,
    Timeout,
    Workspace,
}

impl RenderError {
    pub fn kind(&self) -> RenderErrorKind {
        match self {
            Self::Invocation { .. } => RenderErrorKind::Invocation,
            Self::Compilation { .. } => RenderErrorKind::Compilation,
            Self::Verification { .. } => RenderErrorKind::Verification,
            Self::Timeout { .. } => RenderErrorKind::Timeout,
            Self::Workspace { .. } => RenderErrorKind::Workspace,
        }
    }

    /// Engine-reported diagnostic text for a compilation failure.
    ///
    /// Prefers stderr; some engines only write errors to stdout.
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Compilation { stdout, stderr, .. } => diagnostic_text(stdout, stderr),
            _ => "",
        }
    }
}

fn diagnostic_text<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".into(),
    }
}
