//! Hints attached to failed tool observations.
//!
//! Gateways often answer a bad call with an error like
//! `Missing required field 'calendar_id'`. Pointing the model at the quoted
//! names that are real parameters of the tool, plus the full list of required
//! parameters, is usually enough for it to fix the call on the next turn.

use regex_lite::Regex;
use toolpilot_core::ToolSpec;

/// A quoted identifier: 'name', "name", or `name`.
const QUOTED_NAME: &str = r#"['"`]([A-Za-z_][A-Za-z0-9_.\-]*)['"`]"#;

const MAX_MISSING: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureHints {
    /// Quoted names in the error text that are parameters of the tool
    pub missing_fields: Vec<String>,

    /// Every required parameter of the tool, in name order
    pub required: Vec<String>,
}

impl FailureHints {
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.required.is_empty()
    }

    /// Render as indented lines for the observation text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.missing_fields.is_empty() {
            out.push_str(&format!(
                "Hint: fields mentioned in the error: {}\n",
                self.missing_fields.join(", ")
            ));
        }
        if !self.required.is_empty() {
            out.push_str(&format!(
                "Hint: required parameters for this tool: {}\n",
                self.required.join(", ")
            ));
        }
        out
    }
}

/// Derive hints for a failed call of `spec` that produced `error`.
pub fn failure_hints(error: &str, spec: Option<&ToolSpec>) -> FailureHints {
    let Some(spec) = spec else {
        return FailureHints::default();
    };

    let mut missing_fields = Vec::new();
    if let Ok(re) = Regex::new(QUOTED_NAME) {
        for caps in re.captures_iter(error) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let known = spec
                .parameters
                .keys()
                .any(|p| p.eq_ignore_ascii_case(name));
            if known && !missing_fields.iter().any(|f: &String| f == name) {
                missing_fields.push(name.to_string());
            }
            if missing_fields.len() == MAX_MISSING {
                break;
            }
        }
    }

    let required = spec
        .required_params()
        .map(|(name, _)| name.to_string())
        .collect();

    FailureHints {
        missing_fields,
        required,
    }
}
