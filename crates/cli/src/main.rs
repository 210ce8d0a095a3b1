//! ToolPilot CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write the default config file
//! - `chat`    — Interactive chat or single-message mode, with the reasoning trace
//! - `serve`   — Start the HTTP API server
//! - `tools`   — List the tools the assistant can call
//! - `doctor`  — Check config, backend, and tool gateway health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolpilot",
    about = "ToolPilot — a local assistant that reasons and calls tools",
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
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Hide the reasoning trace
        #[arg(short, long)]
        quiet: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// List the loaded tools
    Tools {
        /// Print tool specs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose config, backend, and tool gateway
    Doctor,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Onboard { force } => commands::onboard::run(force)?,
        Commands::Chat {
            message,
            session,
            quiet,
        } => commands::chat::run(message, session, !quiet).await?,
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Tools { json } => commands::tools::run(json).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
