pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod serve;
pub mod tools;

use anyhow::Context;
use toolpilot_config::AppConfig;

/// Load `~/.toolpilot/config.toml` with environment overrides.
pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("failed to load config")
}

/// Shorten `text` to `max` characters for terminal display.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
