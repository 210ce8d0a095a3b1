//! `toolpilot serve` — Start the HTTP API server.

pub async fn run(port: Option<u16>, host: Option<String>) -> anyhow::Result<()> {
    let mut config = super::load_config()?;

    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    println!("ToolPilot Gateway");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Backend:   {} ({})", config.backend.kind, config.backend.model);

    toolpilot_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
