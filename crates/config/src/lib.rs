//! Configuration loading, validation, and management for ToolPilot.
//!
//! Loads configuration from `~/.toolpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.toolpilot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning backend (local inference endpoint)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tool gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Loop limits and prompt settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Session persistence
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// "ollama" or "openai_compat"
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    #[serde(default = "default_backend_url")]
    pub url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// 0.0 is critical for strict JSON generation
    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the backend to constrain output to JSON
    #[serde(default = "default_true")]
    pub json_mode: bool,

    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Only used by the OpenAI-compatible backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_backend_kind() -> String {
    "ollama".into()
}
fn default_backend_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen2.5-coder:latest".into()
}
fn default_num_ctx() -> u32 {
    4096
}
fn default_backend_timeout() -> u64 {
    120
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: default_backend_url(),
            model: default_model(),
            temperature: 0.0,
            num_ctx: default_num_ctx(),
            max_tokens: None,
            json_mode: true,
            timeout_secs: default_backend_timeout(),
            api_key: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The gateway-side user whose connected accounts tools run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Toolkits to load tools from; unknown or unconnected ones are skipped
    #[serde(default = "default_toolkits")]
    pub toolkits: Vec<String>,

    /// Cap on tools fetched per toolkit
    #[serde(default = "default_tools_per_toolkit")]
    pub tools_per_toolkit: u32,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "https://backend.composio.dev".into()
}
fn default_toolkits() -> Vec<String> {
    vec!["gmail".into(), "googlecalendar".into()]
}
fn default_tools_per_toolkit() -> u32 {
    50
}
fn default_gateway_timeout() -> u64 {
    60
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            api_key: None,
            user_id: None,
            toolkits: default_toolkits(),
            tools_per_toolkit: default_tools_per_toolkit(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("user_id", &self.user_id)
            .field("toolkits", &self.toolkits)
            .field("tools_per_toolkit", &self.tools_per_toolkit)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Thinking→Deciding cycles allowed per request
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Consecutive failed backend calls tolerated within one turn
    #[serde(default = "default_max_backend_attempts")]
    pub max_backend_attempts: u32,

    /// Consecutive unparseable outputs tolerated before giving up
    #[serde(default = "default_max_parse_failures")]
    pub max_consecutive_parse_failures: u32,

    /// Attempts per tool call when the gateway is unreachable
    #[serde(default = "default_max_gateway_attempts")]
    pub max_gateway_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Observations longer than this are truncated in the prompt
    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,

    /// Opening line of the instruction block
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

fn default_max_turns() -> u32 {
    8
}
fn default_max_backend_attempts() -> u32 {
    3
}
fn default_max_parse_failures() -> u32 {
    3
}
fn default_max_gateway_attempts() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_max_observation_chars() -> usize {
    4_000
}
fn default_preamble() -> String {
    "You are a helpful AI assistant running locally. You have access to many different tools across multiple platforms.".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_backend_attempts: default_max_backend_attempts(),
            max_consecutive_parse_failures: default_max_parse_failures(),
            max_gateway_attempts: default_max_gateway_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_observation_chars: default_max_observation_chars(),
            preamble: default_preamble(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS; empty means same-origin only
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// "file" or "memory"
    #[serde(default = "default_sessions_backend")]
    pub backend: String,

    /// Directory for file-backed sessions; defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_sessions_backend() -> String {
    "file".into()
}

impl SessionsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: default_sessions_backend(),
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolpilot/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `COMPOSIO_API_KEY`, `COMPOSIO_USER_ID`
    /// - `TOOLPILOT_MODEL`, `TOOLPILOT_BACKEND_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.gateway.api_key.is_none() {
            self.gateway.api_key = lookup("COMPOSIO_API_KEY");
        }
        if self.gateway.user_id.is_none() {
            self.gateway.user_id = lookup("COMPOSIO_USER_ID");
        }
        if let Some(model) = lookup("TOOLPILOT_MODEL") {
            self.backend.model = model;
        }
        if let Some(url) = lookup("TOOLPILOT_BACKEND_URL") {
            self.backend.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolpilot")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ConfigError::ValidationError(
                "backend.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.backend.kind.as_str(), "ollama" | "openai_compat") {
            return Err(ConfigError::ValidationError(format!(
                "backend.kind must be 'ollama' or 'openai_compat', got '{}'",
                self.backend.kind
            )));
        }

        if !matches!(self.sessions.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "sessions.backend must be 'file' or 'memory', got '{}'",
                self.sessions.backend
            )));
        }

        let limits = [
            ("agent.max_turns", self.agent.max_turns),
            ("agent.max_backend_attempts", self.agent.max_backend_attempts),
            (
                "agent.max_consecutive_parse_failures",
                self.agent.max_consecutive_parse_failures,
            ),
            ("agent.max_gateway_attempts", self.agent.max_gateway_attempts),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be >= 1")));
            }
        }

        if self.agent.backoff_base_ms > self.agent.backoff_max_ms {
            return Err(ConfigError::ValidationError(
                "agent.backoff_base_ms must not exceed agent.backoff_max_ms".into(),
            ));
        }

        Ok(())
    }

    /// Check if gateway credentials are available.
    pub fn has_gateway_credentials(&self) -> bool {
        self.gateway.api_key.is_some() && self.gateway.user_id.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.kind, "ollama");
        assert_eq!(config.backend.model, "qwen2.5-coder:latest");
        assert_eq!(config.agent.max_backend_attempts, 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend.url, config.backend.url);
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.gateway.toolkits, config.gateway.toolkits);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.backend.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_turn_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_turns"));
    }

    #[test]
    fn unknown_backend_kind_rejected() {
        let mut config = AppConfig::default();
        config.backend.kind = "candle".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.backend.kind, "ollama");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
max_turns = 5

[gateway]
toolkits = ["gmail"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.agent.max_backend_attempts, 3);
        assert_eq!(config.gateway.toolkits, vec!["gmail".to_string()]);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "COMPOSIO_API_KEY" => Some("ak_test".into()),
            "COMPOSIO_USER_ID" => Some("user-1".into()),
            "TOOLPILOT_MODEL" => Some("llama3.1".into()),
            _ => None,
        });
        assert!(config.has_gateway_credentials());
        assert_eq!(config.backend.model, "llama3.1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.gateway.api_key = Some("ak_secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("ak_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen2.5-coder"));
        assert!(toml_str.contains("max_turns"));
    }
}
