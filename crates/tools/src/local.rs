//! In-process toolbox.
//!
//! Local tools implement [`LocalTool`] and are registered in a [`Toolbox`],
//! which itself is a [`ToolGateway`]. A toolbox may wrap a remote gateway:
//! names it does not own are delegated, so the loop sees one flat tool set.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolpilot_core::{Arguments, GatewayError, ParamType, ToolGateway, ToolResult, ToolSpec};

/// A tool implemented in this process.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// The declared shape shown to the model. Its name must be unique.
    fn spec(&self) -> ToolSpec;

    /// Run the tool. Arguments have already been validated against `spec`.
    async fn execute(&self, arguments: &Arguments) -> ToolResult;
}

/// A registry of local tools, optionally backed by a remote gateway.
pub struct Toolbox {
    tools: BTreeMap<String, Box<dyn LocalTool>>,
    remote: Option<Arc<dyn ToolGateway>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            remote: None,
        }
    }

    /// The built-in local tools.
    pub fn with_builtins() -> Self {
        let mut toolbox = Self::new();
        toolbox.register(Box::new(CurrentDateTimeTool));
        toolbox
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn LocalTool>) {
        let name = tool.spec().name;
        self.tools.insert(name, tool);
    }

    /// Delegate unknown tool names to a remote gateway.
    pub fn with_remote(mut self, remote: Arc<dyn ToolGateway>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

impl Default for Toolbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolGateway for Toolbox {
    fn name(&self) -> &str {
        match &self.remote {
            Some(remote) => remote.name(),
            None => "local",
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, GatewayError> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        if let Some(remote) = &self.remote {
            let remote_specs = remote.list_tools().await?;
            specs.extend(
                remote_specs
                    .into_iter()
                    .filter(|s| !self.tools.contains_key(&s.name)),
            );
        }
        Ok(specs)
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> Result<ToolResult, GatewayError> {
        if let Some(tool) = self.tools.get(name) {
            return Ok(tool.execute(arguments).await);
        }
        match &self.remote {
            Some(remote) => remote.execute(name, arguments).await,
            None => Ok(ToolResult::failure(format!("tool '{name}' is not available"))),
        }
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        match &self.remote {
            Some(remote) => remote.health_check().await,
            None => Ok(true),
        }
    }
}

/// Reports the current date and time, optionally at a fixed UTC offset.
pub struct CurrentDateTimeTool;

#[async_trait]
impl LocalTool for CurrentDateTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_current_datetime",
            "Get the current date and time in RFC 3339 format.",
        )
        .param(
            "utc_offset_minutes",
            ParamType::Integer,
            false,
            "Offset from UTC in minutes, e.g. 330 for India. Defaults to 0.",
        )
    }

    async fn execute(&self, arguments: &Arguments) -> ToolResult {
        let minutes = arguments
            .get("utc_offset_minutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let offset = i32::try_from(minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .and_then(FixedOffset::east_opt);

        match offset {
            Some(offset) => {
                let now = Utc::now().with_timezone(&offset);
                ToolResult::success(json!({
                    "datetime": now.to_rfc3339(),
                    "date": now.format("%Y-%m-%d").to_string(),
                    "weekday": now.format("%A").to_string(),
                }))
            }
            None => ToolResult::failure(format!("utc_offset_minutes {minutes} is out of range")),
        }
    }
}
