//! `paperclaw doctor` — Diagnose system health.

use paperclaw_config::AppConfig;
use paperclaw_tools::LatexRenderer;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 PaperClaw Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (run `paperclaw onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running other checks.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured for {}", config.default_provider);
    } else {
        println!("  ⚠️  No API key: set OPENROUTER_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    let renderer = LatexRenderer::from_config(&config.render);
    match renderer.probe().await {
        Ok(version) if version.is_empty() => println!("  ✅ Engine '{}' runs", renderer.engine()),
        Ok(version) => println!("  ✅ Engine: {version}"),
        Err(e) => {
            println!("  ❌ Engine '{}' unusable: {e}", renderer.engine());
            issues += 1;
        }
    }

    match tokio::fs::create_dir_all(renderer.output_dir()).await {
        Ok(()) => println!("  ✅ Output directory: {}", renderer.output_dir().display()),
        Err(e) => {
            println!(
                "  ❌ Cannot create output directory {}: {e}",
                renderer.output_dir().display()
            );
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
