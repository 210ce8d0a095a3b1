//! Process-wide wiring: backend, tool gateway, tool set, controller, sessions.
//!
//! Built once at startup and shared (behind `Arc`) by the HTTP server and the
//! CLI. Only read-only collaborators live here; per-request state is the
//! session, loaded and saved by [`SessionService`].

use std::sync::Arc;
use tracing::{info, warn};

use toolpilot_agent::ReactController;
use toolpilot_config::AppConfig;
use toolpilot_core::{ReasoningBackend, SessionStore, ToolGateway, ToolSet};

use crate::sessions::SessionService;

pub struct Runtime {
    pub config: AppConfig,
    pub backend: Arc<dyn ReasoningBackend>,
    pub gateway: Arc<dyn ToolGateway>,
    pub controller: Arc<ReactController>,
    pub sessions: SessionService,
}

impl Runtime {
    /// Build everything from configuration.
    pub async fn from_config(config: AppConfig) -> toolpilot_core::Result<Self> {
        let backend = toolpilot_providers::build_from_config(&config)?;
        let gateway = toolpilot_tools::build_gateway(&config);
        let store = toolpilot_memory::build_from_config(&config);
        Ok(Self::new(config, backend, gateway, store).await)
    }

    /// Assemble a runtime from explicit collaborators.
    ///
    /// If the gateway cannot list its tools, the built-in local tools are
    /// used instead so the assistant can still answer directly.
    pub async fn new(
        config: AppConfig,
        backend: Arc<dyn ReasoningBackend>,
        gateway: Arc<dyn ToolGateway>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let tools = match ToolSet::load(gateway.as_ref()).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(gateway = gateway.name(), error = %e, "Tool listing failed, falling back to built-in tools");
                ToolSet::load(&toolpilot_tools::Toolbox::with_builtins())
                    .await
                    .unwrap_or_default()
            }
        };

        let controller =
            ReactController::from_config(&config, backend.clone(), gateway.clone(), tools);

        info!(
            backend = backend.name(),
            model = %config.backend.model,
            gateway = gateway.name(),
            tools = controller.tools().len(),
            sessions = store.name(),
            "Runtime ready"
        );

        Self {
            config,
            backend,
            gateway,
            controller: Arc::new(controller),
            sessions: SessionService::new(store),
        }
    }
}
