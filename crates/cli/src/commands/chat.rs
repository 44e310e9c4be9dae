//! `paperclaw chat` — Interactive or single-message research chat.

use std::io::Write;
use std::sync::Arc;

use paperclaw_agent::{AgentLoop, ChatSession, TurnOutcome, TurnView, system_prompt};
use paperclaw_channels::CliChannel;
use paperclaw_config::AppConfig;
use paperclaw_core::channel::Channel;
use paperclaw_providers::build_from_config;
use tracing::debug;

const TIPS: &[&str] = &[
    "Start with a broad topic",
    "Ask to refine research directions",
    "Request paper reading/analysis",
    "Ask the agent to write the final paper",
    "Papers are saved as PDFs",
];

/// Commands handled by the chat loop instead of the agent.
#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Clear,
    Stats,
    Tips,
    Help,
    Unknown(String),
}

impl SlashCommand {
    fn parse(line: &str) -> Option<Self> {
        let cmd = line.trim().strip_prefix('/')?;
        Some(match cmd {
            "clear" => Self::Clear,
            "stats" => Self::Stats,
            "tips" => Self::Tips,
            "help" => Self::Help,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Streams a turn's display to a terminal.
///
/// Each new display usually extends the previous one, so only the new
/// suffix is written; anything else starts a fresh block.
struct TerminalView<W: Write> {
    out: W,
    printed: String,
}

impl<W: Write> TerminalView<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
        }
    }

    /// End the turn's output block.
    fn finish(&mut self) {
        if !self.printed.is_empty() {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
        self.printed.clear();
    }
}

impl<W: Write> TurnView for TerminalView<W> {
    fn show(&mut self, display: &str) {
        let result = match display.strip_prefix(self.printed.as_str()) {
            Some(suffix) => write!(self.out, "{suffix}"),
            None => write!(self.out, "\n{display}"),
        };
        match result {
            Ok(()) => self.printed = display.to_string(),
            Err(e) => debug!(error = %e, "Failed to write turn display"),
        }
        let _ = self.out.flush();
    }

    fn show_error(&mut self, message: &str) {
        if !self.printed.is_empty() {
            let _ = writeln!(self.out);
        }
        let _ = self.out.flush();
        eprintln!("{message}");
    }
}

fn is_local_provider(name: &str) -> bool {
    matches!(name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && !is_local_provider(&config.default_provider) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'             (for OpenAI direct)");
        eprintln!("    export PAPERCLAW_API_KEY='sk-...'          (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = build_from_config(&config);
    let provider = router
        .default_provider()
        .ok_or("No default provider configured")?;
    let tools = Arc::new(paperclaw_tools::default_registry(&config.render));
    let agent = AgentLoop::from_config(&config, provider, tools);

    let mut session = ChatSession::new(system_prompt(&config.agent))
        .with_max_iterations(config.agent.max_iterations);
    let mut view = TerminalView::new(std::io::stdout());

    if let Some(msg) = message {
        let outcome = session.submit(&msg, &agent, &mut view).await;
        view.finish();
        return match outcome {
            TurnOutcome::Completed { .. } => Ok(()),
            TurnOutcome::Failed { error } => Err(error.into()),
        };
    }

    println!();
    println!("  📄 PaperClaw — Research AI Agent");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Engine:    {}", config.render.engine);
    println!("  Output:    {}", config.render.output_dir.display());
    println!();
    println!("  What research topic would you like to explore?");
    println!("  Commands: /clear /stats /tips /help. Type 'exit' or Ctrl+D to quit.");
    println!();

    let channel = CliChannel::new();
    let mut rx = channel
        .start()
        .await
        .map_err(|e| format!("Channel error: {e}"))?;

    prompt()?;
    while let Some(result) = rx.recv().await {
        let line = match result {
            Ok(msg) => msg.content,
            Err(e) => {
                eprintln!("  [Channel Error] {e}");
                break;
            }
        };

        match SlashCommand::parse(&line) {
            Some(SlashCommand::Clear) => {
                session.clear();
                println!("  Chat history cleared!");
            }
            Some(SlashCommand::Stats) => {
                let stats = session.stats();
                println!(
                    "  📊 Messages: {} ({} from you, {} from the agent)",
                    stats.messages, stats.user_messages, stats.assistant_messages
                );
            }
            Some(SlashCommand::Tips) => {
                println!("  💡 Tips");
                for tip in TIPS {
                    println!("    - {tip}");
                }
            }
            Some(SlashCommand::Help) => {
                println!("  /clear  forget the conversation");
                println!("  /stats  show message counts");
                println!("  /tips   how to get a paper out of the agent");
                println!("  exit    quit");
            }
            Some(SlashCommand::Unknown(cmd)) => {
                println!("  Unknown command: /{cmd} (try /help)");
            }
            None => {
                println!();
                session.submit(&line, &agent, &mut view).await;
                view.finish();
            }
        }

        println!();
        prompt()?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
