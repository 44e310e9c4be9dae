//! `paperclaw render` — Compile a LaTeX file to PDF without the agent.

use std::io::Write;
use std::path::PathBuf;

use paperclaw_config::{AppConfig, OutputNaming, RenderConfig};
use paperclaw_core::error::RenderError;
use paperclaw_tools::{LatexRenderer, RenderedDocument};
use tokio::io::AsyncReadExt;

/// Command-line overrides for one render.
#[derive(Debug, Default)]
pub struct RenderOptions {
    pub file: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub engine: Option<String>,
    pub timeout_secs: Option<u64>,
    pub per_job: bool,
}

impl RenderOptions {
    fn apply(&self, config: &mut RenderConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(engine) = &self.engine {
            config.engine = engine.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if self.per_job {
            config.naming = OutputNaming::PerJob;
        }
    }

    fn reads_stdin(&self) -> bool {
        self.file.as_os_str() == "-"
    }
}

pub async fn run(options: RenderOptions) -> Result<(), Box<dyn std::error::Error>> {
    // No API key is needed here, only the render section.
    let mut render = AppConfig::load()
        .map_err(|e| format!("Failed to load config: {e}"))?
        .render;
    options.apply(&mut render);
    if render.timeout_secs == 0 {
        return Err("--timeout must be > 0".into());
    }

    let source = if options.reads_stdin() {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(&options.file)
            .await
            .map_err(|e| format!("Cannot read {}: {e}", options.file.display()))?
    };

    let renderer = LatexRenderer::from_config(&render);
    let result = renderer.render(&source).await;
    if !report(&result, &mut std::io::stdout(), &mut std::io::stderr()) {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the outcome of a render; returns whether it succeeded.
fn report(
    result: &Result<RenderedDocument, RenderError>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> bool {
    match result {
        Ok(doc) => {
            let _ = writeln!(out, "✅ PDF generated: {}", doc.path.display());
            let _ = writeln!(out, "   {} bytes in {:.1}s", doc.bytes, doc.elapsed.as_secs_f64());
            true
        }
        Err(e) => {
            let _ = writeln!(err, "❌ Render failed: {e}");
            false
        }
    }
}
