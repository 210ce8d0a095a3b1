//! `toolpilot tools` — List the tools the assistant can call.

use anyhow::Context;
use toolpilot_core::ToolSet;

pub async fn run(json: bool) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let gateway = toolpilot_tools::build_gateway(&config);
    let tools = ToolSet::load(gateway.as_ref())
        .await
        .with_context(|| format!("failed to list tools from {}", gateway.name()))?;

    if json {
        let specs: Vec<_> = tools.specs().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("{} tool(s) from {}:\n", tools.len(), gateway.name());
    for spec in tools.specs() {
        println!("  {}", spec.name);
        if !spec.description.is_empty() {
            println!("      {}", super::preview(spec.description.trim(), 100));
        }
        for (name, param) in &spec.parameters {
            let required = if param.required { "required" } else { "optional" };
            println!("      - {name}: {} ({required})", param.kind);
        }
    }

    Ok(())
}
