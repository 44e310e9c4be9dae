//! Built-in tools for PaperClaw.
//!
//! The agent has one capability outside the conversation: compiling the
//! LaTeX it writes into a PDF with an external typesetting engine.

pub mod latex;
pub mod render_pdf;

use paperclaw_config::RenderConfig;
use paperclaw_core::tool::ToolRegistry;

pub use latex::{LatexRenderer, RenderJob, RenderedDocument};
pub use render_pdf::RenderLatexPdfTool;

/// Create the tool registry the agent runs with.
pub fn default_registry(config: &RenderConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RenderLatexPdfTool::new(LatexRenderer::from_config(config))));
    registry
}
