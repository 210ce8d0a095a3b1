//! `toolpilot doctor` — Diagnose config, backend, and tool gateway.

use toolpilot_config::AppConfig;
use toolpilot_gateway::Runtime;

pub async fn run() -> anyhow::Result<()> {
    println!("ToolPilot Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `toolpilot onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    if config.has_gateway_credentials() {
        println!("  ✅ Composio credentials configured");
    } else {
        println!("  ⚠️  No Composio credentials, only built-in tools will be available");
        issues += 1;
    }

    let runtime = match Runtime::from_config(config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("  ❌ Cannot build runtime: {e}");
            return Ok(());
        }
    };

    let backend = runtime.backend.name();
    match runtime.backend.health_check().await {
        Ok(true) => println!(
            "  ✅ Backend {backend} reachable at {}",
            runtime.config.backend.url
        ),
        Ok(false) => {
            println!("  ❌ Backend {backend} answered but is not healthy");
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Backend {backend} unreachable: {e}");
            issues += 1;
        }
    }

    let gateway = runtime.gateway.name();
    match runtime.gateway.health_check().await {
        Ok(true) => println!("  ✅ Tool gateway {gateway} reachable"),
        Ok(false) => {
            println!("  ❌ Tool gateway {gateway} is not healthy");
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Tool gateway {gateway} unreachable: {e}");
            issues += 1;
        }
    }
    println!("  ✅ {} tool(s) loaded", runtime.controller.tools().len());

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
