//! PaperClaw CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive research chat, or a single message with `-m`
//! - `render`   — Compile a LaTeX file to PDF
//! - `onboard`  — Write the default config
//! - `doctor`   — Diagnose config, API key and typesetting engine

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "paperclaw",
    about = "PaperClaw — research agent that writes papers and renders them to PDF",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the research agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Compile a LaTeX file to PDF
    Render {
        /// LaTeX source file (`-` reads stdin)
        file: PathBuf,

        /// Directory receiving the source copy and the PDF
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Typesetting engine executable
        #[arg(short, long)]
        engine: Option<String>,

        /// Seconds before the engine is killed
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Give every render its own file names
        #[arg(long)]
        per_job: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed replies.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Render {
            file,
            output_dir,
            engine,
            timeout,
            per_job,
        } => {
            commands::render::run(commands::render::RenderOptions {
                file,
                output_dir,
                engine,
                timeout_secs: timeout,
                per_job,
            })
            .await?
        }
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
