//! `toolpilot onboard` — Write the default config file.

use anyhow::Context;
use toolpilot_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("ToolPilot — First-Time Setup");
    println!("============================\n");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("cannot create {}", config_dir.display()))?;

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually, or re-run with --force to overwrite.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("cannot write {}", config_path.display()))?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Start Ollama and pull a model: ollama pull qwen2.5-coder");
    println!("   2. For app tools, set COMPOSIO_API_KEY and COMPOSIO_USER_ID");
    println!("   3. Run: toolpilot doctor");
    println!("   4. Run: toolpilot chat\n");

    Ok(())
}
