//! Composio tool gateway.
//!
//! Tools are loaded per toolkit (`gmail`, `googlecalendar`, ...) from the
//! Composio v3 REST API and executed on behalf of a configured user. OAuth
//! and connected-account management stay on the Composio side; this adapter
//! only ever sees tool slugs, argument objects, and results.
//!
//! Result mapping:
//! - 2xx with `successful: true` → `ToolResult::Success` carrying `data`
//! - 2xx with `successful: false`, or any 4xx → `ToolResult::Failure`
//! - 5xx, transport errors, timeouts → `GatewayError::Unavailable`
//! - unparseable 2xx bodies → `GatewayError::Protocol`

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use toolpilot_core::{Arguments, GatewayError, ToolGateway, ToolResult, ToolSpec};
use tracing::{debug, info, warn};

/// Longest error message carried into a failure result.
const MAX_ERROR_CHARS: usize = 500;

pub struct ComposioGateway {
    base_url: String,
    api_key: String,
    user_id: String,
    toolkits: Vec<String>,
    tools_per_toolkit: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl ComposioGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            user_id: user_id.into(),
            toolkits: Vec::new(),
            tools_per_toolkit: 50,
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `[gateway]` config section. Requires both credentials.
    pub fn from_config(config: &toolpilot_config::GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::NotConfigured("COMPOSIO_API_KEY is not set".into()))?;
        let user_id = config
            .user_id
            .clone()
            .ok_or_else(|| GatewayError::NotConfigured("COMPOSIO_USER_ID is not set".into()))?;

        Ok(Self::new(&config.url, api_key, user_id)
            .with_toolkits(config.toolkits.clone())
            .with_tools_per_toolkit(config.tools_per_toolkit)
            .with_timeout(config.timeout()))
    }

    pub fn with_toolkits(mut self, toolkits: Vec<String>) -> Self {
        self.toolkits = toolkits;
        self
    }

    pub fn with_tools_per_toolkit(mut self, limit: u32) -> Self {
        self.tools_per_toolkit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_toolkit(&self, toolkit: &str) -> Result<Vec<ToolSpec>, GatewayError> {
        let url = format!("{}/api/v3/tools", self.base_url);
        let limit = self.tools_per_toolkit.to_string();
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[("toolkit_slug", toolkit), ("limit", limit.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Protocol(format!(
                "listing toolkit '{toolkit}' returned {status}: {}",
                error_message(&text)
            )));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Protocol(format!("invalid tool list: {e}")))?;
        Ok(parse_tool_list(&body))
    }
}

/// Map a reqwest failure onto the gateway taxonomy.
fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Unavailable(format!("request timed out: {err}"))
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

/// Convert a `/api/v3/tools` listing into specs.
///
/// Accepts both `{"items": [...]}` and a bare array. Entries without a slug
/// are skipped.
pub fn parse_tool_list(body: &Value) -> Vec<ToolSpec> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());

    items
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let slug = item["slug"].as_str()?;
                    let description = item["description"]
                        .as_str()
                        .or_else(|| item["name"].as_str())
                        .unwrap_or("");
                    let schema = item
                        .get("input_parameters")
                        .or_else(|| item.get("parameters"))
                        .unwrap_or(&Value::Null);
                    Some(ToolSpec::from_json_schema(slug, description, schema))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Interpret an execution response by status code and body.
pub fn interpret_execution(status: u16, body: &str) -> Result<ToolResult, GatewayError> {
    match status {
        200..=299 => {
            let parsed: Value = serde_json::from_str(body)
                .map_err(|e| GatewayError::Protocol(format!("invalid execution response: {e}")))?;
            let successful = parsed
                .get("successful")
                .or_else(|| parsed.get("successfull"))
                .and_then(Value::as_bool)
                .unwrap_or_else(|| parsed["error"].is_null());

            if successful {
                let payload = match parsed.get("data") {
                    Some(Value::Null) | None => json!({}),
                    Some(data) => data.clone(),
                };
                Ok(ToolResult::success(payload))
            } else {
                Ok(ToolResult::failure(error_message(body)))
            }
        }
        400..=499 => Ok(ToolResult::failure(format!(
            "HTTP {status}: {}",
            error_message(body)
        ))),
        _ => Err(GatewayError::Unavailable(format!(
            "gateway returned {status}: {}",
            error_message(body)
        ))),
    }
}

/// Pull the most human-readable error out of a response body.
///
/// Looks at `error.message`, `error`, then `message`; falls back to the raw
/// body, truncated.
pub fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let found = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| v.get("error").and_then(Value::as_str))
            .or_else(|| v.get("message").and_then(Value::as_str))
            .map(str::to_string)
    });

    let message = found.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_CHARS {
        message.chars().take(MAX_ERROR_CHARS).collect::<String>() + "..."
    } else if message.is_empty() {
        "unknown error".into()
    } else {
        message
    }
}

#[async_trait]
impl ToolGateway for ComposioGateway {
    fn name(&self) -> &str {
        "composio"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, GatewayError> {
        let mut specs = Vec::new();
        let mut last_unavailable = None;

        for toolkit in &self.toolkits {
            match self.fetch_toolkit(toolkit).await {
                Ok(tools) if tools.is_empty() => {
                    debug!(toolkit = %toolkit, "Toolkit returned no tools");
                }
                Ok(tools) => {
                    info!(toolkit = %toolkit, count = tools.len(), "Loaded toolkit");
                    specs.extend(tools);
                }
                Err(e) => {
                    warn!(toolkit = %toolkit, error = %e, "Skipping toolkit");
                    if matches!(e, GatewayError::Unavailable(_)) {
                        last_unavailable = Some(e);
                    }
                }
            }
        }

        // An unreachable gateway with nothing loaded is not an empty tool set.
        match last_unavailable {
            Some(e) if specs.is_empty() => Err(e),
            _ => Ok(specs),
        }
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> Result<ToolResult, GatewayError> {
        let url = format!("{}/api/v3/tools/execute/{}", self.base_url, name);
        let body = json!({
            "arguments": arguments,
            "user_id": self.user_id,
        });

        debug!(tool = %name, "Executing tool via Composio");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        let result = interpret_execution(status, &text)?;
        if let ToolResult::Failure { error } = &result {
            warn!(tool = %name, status, error = %error, "Tool reported failure");
        }
        Ok(result)
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        let url = format!("{}/api/v3/toolkits", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[("limit", "1")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolpilot_core::ParamType;

    #[test]
    fn parses_tool_listing() {
        let body = json!({
            "items": [
                {
                    "slug": "GMAIL_FETCH_EMAILS",
                    "name": "Fetch emails",
                    "description": "Fetch emails from the inbox",
                    "input_parameters": {
                        "type": "object",
                        "properties": {
                            "max_results": { "type": "integer" },
                            "query": { "type": "string" }
                        },
                        "required": ["max_results"]
                    }
                },
                { "name": "no slug, skipped" }
            ]
        });
        let specs = parse_tool_list(&body);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "GMAIL_FETCH_EMAILS");
        assert_eq!(specs[0].parameters["max_results"].kind, ParamType::Integer);
        assert!(specs[0].parameters["max_results"].required);
        assert!(!specs[0].parameters["query"].required);
    }

    #[test]
    fn success_carries_data() {
        let result =
            interpret_execution(200, r#"{"data":{"messages":[]},"error":null,"successful":true}"#)
                .unwrap();
        assert_eq!(result, ToolResult::success(json!({"messages": []})));
    }

    #[test]
    fn unsuccessful_2xx_is_tool_failure() {
        let result =
            interpret_execution(200, r#"{"data":null,"error":"rate limited","successful":false}"#)
                .unwrap();
        assert_eq!(result, ToolResult::failure("rate limited"));
    }

    #[test]
    fn client_errors_are_tool_failures() {
        let result =
            interpret_execution(401, r#"{"error":{"message":"Connected account expired"}}"#)
                .unwrap();
        match result {
            ToolResult::Failure { error } => assert!(error.contains("Connected account expired")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_unavailable() {
        let err = interpret_execution(503, "upstream down").unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[test]
    fn malformed_success_body_is_protocol_error() {
        let err = interpret_execution(200, "<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[test]
    fn long_errors_truncated() {
        let body = "x".repeat(2000);
        let message = error_message(&body);
        assert!(message.len() < 600);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn from_config_requires_credentials() {
        let config = toolpilot_config::GatewayConfig::default();
        assert!(matches!(
            ComposioGateway::from_config(&config),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_gateway_fails_listing() {
        let gateway = ComposioGateway::new("http://127.0.0.1:1", "key", "user")
            .with_toolkits(vec!["gmail".into()]);
        let err = gateway.list_tools().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
