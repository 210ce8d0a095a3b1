//! Output parsing and validation.
//!
//! Turns raw model text into an [`AgentDecision`] or a [`ParseFailure`].
//! Validation order:
//!
//! 1. isolate one well-formed JSON object (surrounding prose is tolerated)
//! 2. `action` must be exactly `"respond"` or `"tool"`
//! 3. tool calls: known name, object arguments, required and typed parameters
//! 4. responses: non-blank `text`
//!
//! Parsing is pure: the same text and tool set always give the same result.

use serde_json::{Map, Value};
use toolpilot_core::{Arguments, ToolSet, ToolSpec};

/// What the model decided to do this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    Respond { text: String },
    Invoke { tool_name: String, arguments: Arguments },
}

/// A successfully parsed model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub decision: AgentDecision,

    /// Prose the model wrote around the JSON object, if any
    pub thought: Option<String>,
}

/// Why a model output was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailureKind {
    MalformedOutput,
    UnknownAction { found: String },
    UnknownTool { name: String },
    ArgumentMismatch { tool: String, missing_or_invalid: Vec<String> },
    EmptyResponse,
}

impl ParseFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedOutput => "malformed_output",
            Self::UnknownAction { .. } => "unknown_action",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::ArgumentMismatch { .. } => "argument_mismatch",
            Self::EmptyResponse => "empty_response",
        }
    }
}

/// A rejected model output, with a reason phrased for the model to act on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub reason: String,
    pub raw_text: String,
}

impl ParseFailure {
    fn new(kind: ParseFailureKind, reason: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            reason: reason.into(),
            raw_text: raw.to_string(),
        }
    }
}

const MAX_SUGGESTIONS: usize = 3;
const MAX_LISTED_TOOLS: usize = 10;

/// Parse raw model output against the loaded tool set.
pub fn parse_output(raw: &str, tools: &ToolSet) -> Result<ParsedTurn, ParseFailure> {
    let (span, object) = select_candidate(raw)?;
    let thought = surrounding_prose(raw, span);

    let action = match object.get("action") {
        Some(Value::String(a)) => a.as_str(),
        Some(other) => {
            return Err(unknown_action(other.to_string(), raw));
        }
        None => return Err(unknown_action("(missing)".into(), raw)),
    };

    let decision = match action {
        "respond" => parse_respond(&object, raw)?,
        "tool" => parse_tool(&object, tools, raw)?,
        other => return Err(unknown_action(other.to_string(), raw)),
    };

    Ok(ParsedTurn { decision, thought })
}

fn unknown_action(found: String, raw: &str) -> ParseFailure {
    ParseFailure::new(
        ParseFailureKind::UnknownAction {
            found: found.clone(),
        },
        format!(r#"unknown action {found}; "action" must be exactly "respond" or "tool""#),
        raw,
    )
}

fn parse_respond(object: &Map<String, Value>, raw: &str) -> Result<AgentDecision, ParseFailure> {
    match object.get("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(AgentDecision::Respond {
            text: text.clone(),
        }),
        _ => Err(ParseFailure::new(
            ParseFailureKind::EmptyResponse,
            r#"a "respond" action needs a non-empty "text" string"#,
            raw,
        )),
    }
}

fn parse_tool(
    object: &Map<String, Value>,
    tools: &ToolSet,
    raw: &str,
) -> Result<AgentDecision, ParseFailure> {
    let name = match object.get("name") {
        Some(Value::String(n)) => n.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let Some(spec) = tools.get(&name) else {
        return Err(ParseFailure::new(
            ParseFailureKind::UnknownTool { name: name.clone() },
            unknown_tool_reason(&name, tools),
            raw,
        ));
    };

    let arguments = match object.get("arguments") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => {
            return Err(ParseFailure::new(
                ParseFailureKind::ArgumentMismatch {
                    tool: name.clone(),
                    missing_or_invalid: vec!["arguments".into()],
                },
                format!(r#""arguments" for '{name}' must be a JSON object"#),
                raw,
            ));
        }
    };

    let problems = check_arguments(spec, &arguments);
    if !problems.is_empty() {
        let details: Vec<String> = problems.iter().map(|(n, why)| format!("{n} ({why})")).collect();
        return Err(ParseFailure::new(
            ParseFailureKind::ArgumentMismatch {
                tool: name.clone(),
                missing_or_invalid: problems.into_iter().map(|(n, _)| n).collect(),
            },
            format!(
                "missing or invalid arguments for '{name}': {}",
                details.join(", ")
            ),
            raw,
        ));
    }

    Ok(AgentDecision::Invoke {
        tool_name: name,
        arguments,
    })
}

/// Offending parameters in name order, each with a short explanation.
///
/// A `null` value counts as absent. Undeclared arguments are not checked.
fn check_arguments(spec: &ToolSpec, arguments: &Arguments) -> Vec<(String, String)> {
    spec.parameters
        .iter()
        .filter_map(|(name, param)| match arguments.get(name) {
            None | Some(Value::Null) if param.required => {
                Some((name.clone(), format!("missing, expected {}", param.kind)))
            }
            None | Some(Value::Null) => None,
            Some(value) if !param.kind.accepts(value) => {
                Some((name.clone(), format!("expected {}", param.kind)))
            }
            Some(_) => None,
        })
        .collect()
}

fn unknown_tool_reason(name: &str, tools: &ToolSet) -> String {
    let lowered = name.to_lowercase();
    let suggestions: Vec<&str> = tools
        .names()
        .into_iter()
        .filter(|candidate| {
            let c = candidate.to_lowercase();
            !lowered.is_empty() && (c == lowered || c.contains(&lowered) || lowered.contains(&c))
        })
        .take(MAX_SUGGESTIONS)
        .collect();

    if !suggestions.is_empty() {
        return format!(
            "unknown tool '{name}'; did you mean: {}?",
            suggestions.join(", ")
        );
    }

    let mut listed: Vec<&str> = tools.names();
    let more = listed.len().saturating_sub(MAX_LISTED_TOOLS);
    listed.truncate(MAX_LISTED_TOOLS);
    let mut reason = format!("unknown tool '{name}'; available tools: {}", listed.join(", "));
    if more > 0 {
        reason.push_str(&format!(" (and {more} more)"));
    }
    reason
}

/// Pick the single JSON object the model meant as its decision.
fn select_candidate(raw: &str) -> Result<((usize, usize), Map<String, Value>), ParseFailure> {
    let parsed = json_objects(raw);

    let malformed = |reason: &str| ParseFailure::new(ParseFailureKind::MalformedOutput, reason, raw);

    if parsed.len() <= 1 {
        return parsed.into_iter().next().ok_or_else(|| {
            malformed("no well-formed JSON object found; reply with exactly one JSON object")
        });
    }

    let mut with_action: Vec<_> = parsed
        .into_iter()
        .filter(|(_, obj)| obj.contains_key("action"))
        .collect();
    if with_action.len() == 1 {
        Ok(with_action.remove(0))
    } else {
        Err(malformed(
            "found several JSON objects and could not tell which is the decision; reply with exactly one",
        ))
    }
}

/// Top-level JSON objects in the text, with their byte spans.
///
/// A `{` that never closes, or whose block is not a JSON object, is treated
/// as prose and the scan resumes at the next `{`. Objects recovered from
/// inside such a span only count when they carry an `action` key, so the
/// `arguments` of a broken decision are never mistaken for one.
fn json_objects(text: &str) -> Vec<((usize, usize), Map<String, Value>)> {
    let mut found = Vec::new();
    let mut pos = 0usize;
    let mut broken_until = 0usize;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let end = closing_brace(text, start);
        if let Some(end) = end
            && let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&text[start..end])
        {
            if start >= broken_until || obj.contains_key("action") {
                found.push(((start, end), obj));
            }
            pos = end;
            continue;
        }
        broken_until = broken_until.max(end.unwrap_or(text.len()));
        pos = start + 1;
    }
    found
}

/// End (exclusive) of the balanced block opening at `start`.
///
/// Braces inside JSON strings are ignored, including escaped quotes.
fn closing_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            '"' => in_string = true,
            _ => {}
        }
    }
    None
}

/// Text outside the chosen block, without code fences.
fn surrounding_prose(raw: &str, (start, end): (usize, usize)) -> Option<String> {
    let outside = format!("{} {}", &raw[..start], &raw[end..]);
    let cleaned = outside.replace("```json", "").replace("```", "");
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolpilot_core::ParamType;

    fn tools() -> ToolSet {
        ToolSet::new(vec![
            ToolSpec::new("list_emails", "List emails")
                .param("max_results", ParamType::Integer, true, "")
                .param("query", ParamType::String, false, ""),
            ToolSpec::new("send_email", "Send an email")
                .param("to", ParamType::String, true, "")
                .param("body", ParamType::String, true, ""),
            ToolSpec::new("GMAIL_FETCH_EMAILS", "Fetch"),
        ])
    }

    fn kind(raw: &str) -> ParseFailureKind {
        parse_output(raw, &tools()).unwrap_err().kind
    }

    #[test]
    fn respond_plain() {
        let turn = parse_output(r#"{"action":"respond","text":"Hello"}"#, &tools()).unwrap();
        assert_eq!(
            turn.decision,
            AgentDecision::Respond {
                text: "Hello".into()
            }
        );
        assert_eq!(turn.thought, None);
    }

    #[test]
    fn tool_call_with_prose_and_fences() {
        let raw = "I will look at the inbox.\n```json\n{\"action\": \"tool\", \"name\": \"list_emails\", \"arguments\": {\"max_results\": 5}}\n```";
        let turn = parse_output(raw, &tools()).unwrap();
        match turn.decision {
            AgentDecision::Invoke {
                tool_name,
                arguments,
            } => {
                assert_eq!(tool_name, "list_emails");
                assert_eq!(arguments["max_results"], 5);
            }
            other => panic!("expected invoke, got {other:?}"),
        }
        assert_eq!(turn.thought.as_deref(), Some("I will look at the inbox."));
    }

    #[test]
    fn stray_brace_in_prose_does_not_hide_decision() {
        let hello = AgentDecision::Respond {
            text: "Hello".into(),
        };

        let raw = "I'll fill in the {placeholder now.\n{\"action\":\"respond\",\"text\":\"Hello\"}";
        let turn = parse_output(raw, &tools()).unwrap();
        assert_eq!(turn.decision, hello);
        assert_eq!(turn.thought.as_deref(), Some("I'll fill in the {placeholder now."));

        let raw = r#"Note: the user said "hi {" earlier. {"action":"respond","text":"Hello"}"#;
        assert_eq!(parse_output(raw, &tools()).unwrap().decision, hello);
    }

    #[test]
    fn arguments_of_broken_decision_are_not_a_candidate() {
        let raw = r#"{"action":"tool","name":list_emails,"arguments":{"max_results":5}}"#;
        assert_eq!(kind(raw), ParseFailureKind::MalformedOutput);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let raw = r#"{"action":"respond","text":"use {curly} and \"quotes\" }"}"#;
        let turn = parse_output(raw, &tools()).unwrap();
        assert_eq!(
            turn.decision,
            AgentDecision::Respond {
                text: r#"use {curly} and "quotes" }"#.into()
            }
        );
    }

    #[test]
    fn no_json_is_malformed() {
        assert_eq!(kind("Sure, here is your answer."), ParseFailureKind::MalformedOutput);
        assert_eq!(kind("{not json at all}"), ParseFailureKind::MalformedOutput);
        assert_eq!(kind(r#"{"action":"respond""#), ParseFailureKind::MalformedOutput);
    }

    #[test]
    fn several_blocks_prefers_the_one_with_action() {
        let raw = r#"Example input: {"max_results": 5}. Decision: {"action":"respond","text":"ok"}"#;
        let turn = parse_output(raw, &tools()).unwrap();
        assert!(matches!(turn.decision, AgentDecision::Respond { .. }));
    }

    #[test]
    fn two_actions_are_ambiguous() {
        let raw = r#"{"action":"respond","text":"a"} {"action":"respond","text":"b"}"#;
        assert_eq!(kind(raw), ParseFailureKind::MalformedOutput);
    }

    #[test]
    fn unknown_action() {
        assert_eq!(
            kind(r#"{"action":"Respond","text":"x"}"#),
            ParseFailureKind::UnknownAction {
                found: "Respond".into()
            }
        );
        assert!(matches!(
            kind(r#"{"text":"x"}"#),
            ParseFailureKind::UnknownAction { .. }
        ));
    }

    #[test]
    fn unknown_tool_never_falls_back() {
        let failure =
            parse_output(r#"{"action":"tool","name":"gmail_fetch_emails"}"#, &tools()).unwrap_err();
        assert_eq!(
            failure.kind,
            ParseFailureKind::UnknownTool {
                name: "gmail_fetch_emails".into()
            }
        );
        assert!(failure.reason.contains("did you mean: GMAIL_FETCH_EMAILS"));

        let failure =
            parse_output(r#"{"action":"tool","name":"weather"}"#, &tools()).unwrap_err();
        assert!(failure.reason.contains("available tools:"));
    }

    #[test]
    fn missing_required_argument_named_exactly() {
        assert_eq!(
            kind(r#"{"action":"tool","name":"list_emails","arguments":{}}"#),
            ParseFailureKind::ArgumentMismatch {
                tool: "list_emails".into(),
                missing_or_invalid: vec!["max_results".into()],
            }
        );
        assert_eq!(
            kind(r#"{"action":"tool","name":"send_email","arguments":{"subject":"hi"}}"#),
            ParseFailureKind::ArgumentMismatch {
                tool: "send_email".into(),
                missing_or_invalid: vec!["body".into(), "to".into()],
            }
        );
    }

    #[test]
    fn types_are_strict() {
        assert_eq!(
            kind(r#"{"action":"tool","name":"list_emails","arguments":{"max_results":"5"}}"#),
            ParseFailureKind::ArgumentMismatch {
                tool: "list_emails".into(),
                missing_or_invalid: vec!["max_results".into()],
            }
        );
        assert_eq!(
            kind(r#"{"action":"tool","name":"list_emails","arguments":{"max_results":5,"query":7}}"#),
            ParseFailureKind::ArgumentMismatch {
                tool: "list_emails".into(),
                missing_or_invalid: vec!["query".into()],
            }
        );
    }

    #[test]
    fn arguments_must_be_object() {
        assert_eq!(
            kind(r#"{"action":"tool","name":"list_emails","arguments":"max_results=5"}"#),
            ParseFailureKind::ArgumentMismatch {
                tool: "list_emails".into(),
                missing_or_invalid: vec!["arguments".into()],
            }
        );
    }

    #[test]
    fn absent_arguments_and_extras() {
        let turn = parse_output(r#"{"action":"tool","name":"GMAIL_FETCH_EMAILS"}"#, &tools()).unwrap();
        assert!(matches!(turn.decision, AgentDecision::Invoke { ref arguments, .. } if arguments.is_empty()));

        let turn = parse_output(
            r#"{"action":"tool","name":"list_emails","arguments":{"max_results":3,"label":"INBOX"}}"#,
            &tools(),
        )
        .unwrap();
        assert!(matches!(turn.decision, AgentDecision::Invoke { ref arguments, .. } if arguments.contains_key("label")));
    }

    #[test]
    fn blank_response_rejected() {
        assert_eq!(kind(r#"{"action":"respond","text":"   "}"#), ParseFailureKind::EmptyResponse);
        assert_eq!(kind(r#"{"action":"respond"}"#), ParseFailureKind::EmptyResponse);
    }

    #[test]
    fn parsing_is_idempotent() {
        let inputs = [
            r#"{"action":"respond","text":"Hello"}"#,
            "nonsense",
            r#"{"action":"tool","name":"list_emails","arguments":{}}"#,
        ];
        for raw in inputs {
            assert_eq!(parse_output(raw, &tools()), parse_output(raw, &tools()));
        }
    }

    #[test]
    fn failure_keeps_raw_text() {
        let failure = parse_output("oops", &tools()).unwrap_err();
        assert_eq!(failure.raw_text, "oops");
        assert_eq!(failure.kind.as_str(), "malformed_output");
    }
}
