//! Tool gateway adapters for ToolPilot.
//!
//! - [`composio`]: third-party app actions through the Composio REST API
//! - [`local`]: in-process tools, optionally layered over a remote gateway
//! - [`formatters`]: readable summaries of raw payloads in final replies

pub mod composio;
pub mod formatters;
pub mod local;

pub use composio::ComposioGateway;
pub use formatters::format_reply;
pub use local::{CurrentDateTimeTool, LocalTool, Toolbox};

use std::sync::Arc;
use toolpilot_core::ToolGateway;

/// Build the gateway for this process from configuration.
///
/// Built-in local tools are always available. Composio tools are layered on
/// top when credentials are configured.
pub fn build_gateway(config: &toolpilot_config::AppConfig) -> Arc<dyn ToolGateway> {
    let toolbox = Toolbox::with_builtins();
    match ComposioGateway::from_config(&config.gateway) {
        Ok(composio) => Arc::new(toolbox.with_remote(Arc::new(composio))),
        Err(e) => {
            tracing::warn!(error = %e, "Composio not configured, using local tools only");
            Arc::new(toolbox)
        }
    }
}
