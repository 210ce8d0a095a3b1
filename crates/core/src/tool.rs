//! Tool contract — the abstraction over externally executed capabilities.
//!
//! A tool is a named action with a declared argument schema. Tools are owned
//! by a [`ToolGateway`], which lists their specs once at startup and executes
//! them on request. The loop only ever sees [`ToolSpec`]s and [`ToolResult`]s,
//! never the concrete per-application logic behind them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::GatewayError;

/// Tool arguments as a JSON object.
pub type Arguments = Map<String, Value>;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Schema did not declare a usable type; any non-null value is accepted.
    Any,
}

impl ParamType {
    /// Map a JSON-schema `type` value onto a parameter type.
    ///
    /// Union types (`["string", "null"]`) resolve to their first non-null member.
    pub fn from_schema(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::from_name(s),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(Self::from_name)
                .unwrap_or(Self::Any),
            _ => Self::Any,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Any,
        }
    }

    /// Strict type check: no coercion between strings and numbers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// The declared shape of a tool, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name (e.g., "GMAIL_FETCH_EMAILS")
    pub name: String,

    /// What the tool does (sent to the model)
    pub description: String,

    /// Parameters keyed by name; ordered for deterministic rendering
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style parameter declaration.
    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.insert(
            name.into(),
            ParamSpec {
                kind,
                required,
                description: description.into(),
            },
        );
        self
    }

    /// Build a spec from a JSON-schema object (`properties` + `required`).
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &Value,
    ) -> Self {
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let parameters = schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .iter()
                    .map(|(pname, prop)| {
                        let spec = ParamSpec {
                            kind: ParamType::from_schema(prop.get("type")),
                            required: required.contains(&pname.as_str()),
                            description: prop["description"].as_str().unwrap_or("").to_string(),
                        };
                        (pname.clone(), spec)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names of required parameters, in name order.
    pub fn required_params(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(n, p)| (n.as_str(), p))
    }
}

/// The outcome of executing a tool.
///
/// A failure here means the tool ran and the remote side reported an error.
/// It is data for the model to reason about, not a controller-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { payload: Value },
    Failure { error: String },
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// An adapter to whatever executes tools: a remote gateway or in-process code.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "composio", "local").
    fn name(&self) -> &str;

    /// List every tool this gateway can execute.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolSpec>, GatewayError>;

    /// Execute a tool. Expected remote failures come back as `ToolResult::Failure`;
    /// only an unreachable or misbehaving gateway produces `Err`.
    async fn execute(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> std::result::Result<ToolResult, GatewayError>;

    /// Health check — can we reach the gateway?
    async fn health_check(&self) -> std::result::Result<bool, GatewayError> {
        Ok(true)
    }
}

/// Read-only snapshot of the tools loaded for this process.
///
/// Loaded once, then shared behind an `Arc` by every loop instance.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolSet {
    /// Build a set from specs. Later duplicates replace earlier ones.
    pub fn new(specs: impl IntoIterator<Item = ToolSpec>) -> Self {
        let tools = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { tools }
    }

    /// Load the tool list from a gateway.
    pub async fn load(gateway: &dyn ToolGateway) -> std::result::Result<Arc<Self>, GatewayError> {
        let specs = gateway.list_tools().await?;
        tracing::info!(gateway = gateway.name(), count = specs.len(), "Tool specs loaded");
        Ok(Arc::new(Self::new(specs)))
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Specs in name order.
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
