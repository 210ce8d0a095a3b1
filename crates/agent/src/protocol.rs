//! Prompt encoding: instruction block, tool catalogue, and transcript.
//!
//! The encoder is a pure function of its inputs. Given the same transcript,
//! tool set, budget, and configuration it produces a byte-identical
//! [`Prompt`], which keeps backend calls reproducible and easy to test.
//! The current date is an explicit input to [`PromptEncoder::encode_on`].

use chrono::NaiveDate;
use serde_json::{Value, json};
use toolpilot_core::{
    EntryContent, Prompt, PromptRole, PromptTurn, ToolResult, ToolSet, ToolSpec, TranscriptEntry,
};

use crate::hints::failure_hints;

const DEFAULT_PREAMBLE: &str = "You are a helpful AI assistant running locally. You have access to many different tools across multiple platforms.";

const PROTOCOL: &str = r#"You MUST reply with exactly one JSON object and nothing else. It has one of two shapes:

1. To answer the user directly:
{"action": "respond", "text": "<your answer>"}

2. To call a tool:
{"action": "tool", "name": "<exact tool name>", "arguments": {"<parameter>": <value>}}

Rules:
- Use EXACT tool names from the list below. Do not modify or guess names.
- "arguments" MUST be a JSON object. Include every required parameter with a value of the declared type.
- ID fields usually end in "id" or "Id" (e.g. calendar_id, message_id). The primary calendar is usually "primary".
- After a tool call you will receive an Observation. Failed observations explain which fields were wrong.
- When you have enough information, respond. Never invent tool results."#;

const TRUNCATION_MARKER: &str = "[truncated]";

/// Encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Opening line(s) of the instruction block
    pub preamble: String,

    /// Observations longer than this many characters are truncated
    pub max_observation_chars: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.into(),
            max_observation_chars: 4_000,
        }
    }
}

/// Builds the backend prompt for one Thinking step.
#[derive(Debug, Clone, Default)]
pub struct PromptEncoder {
    config: EncoderConfig,
}

impl PromptEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Encode the transcript, tools, and remaining step budget into a prompt.
    pub fn encode(&self, transcript: &[TranscriptEntry], tools: &ToolSet, steps_left: u32) -> Prompt {
        self.encode_on(transcript, tools, steps_left, None)
    }

    /// Like [`encode`](Self::encode), with today's date stated after the
    /// preamble so relative dates resolve.
    pub fn encode_on(
        &self,
        transcript: &[TranscriptEntry],
        tools: &ToolSet,
        steps_left: u32,
        today: Option<NaiveDate>,
    ) -> Prompt {
        Prompt {
            system: self.instruction_block(tools, steps_left, today),
            turns: self.render_transcript(transcript, tools),
        }
    }

    fn instruction_block(&self, tools: &ToolSet, steps_left: u32, today: Option<NaiveDate>) -> String {
        let mut out = String::new();
        out.push_str(self.config.preamble.trim());
        if let Some(today) = today {
            out.push_str(&format!("\nToday is {}.", today.format("%A, %B %-d, %Y")));
        }
        out.push_str("\n\n");
        out.push_str(PROTOCOL);
        out.push_str("\n\n");

        if tools.is_empty() {
            out.push_str("No tools are available. Always respond directly.\n");
        } else {
            out.push_str(&format!("Available tools ({}):\n", tools.len()));
            for spec in tools.specs() {
                out.push_str(&render_tool(spec));
            }
            out.push_str(&format!("\nTool names: {}\n", tools.names().join(", ")));
        }

        out.push_str(&format!(
            "\nYou have at most {steps_left} more step(s) for this request. Respond before running out.\n"
        ));
        out
    }

    fn render_transcript(&self, transcript: &[TranscriptEntry], tools: &ToolSet) -> Vec<PromptTurn> {
        let mut turns: Vec<PromptTurn> = Vec::new();
        for entry in transcript {
            let (role, content) = match &entry.content {
                EntryContent::User { content } => (PromptRole::User, content.clone()),
                EntryContent::AgentThought { content } => (PromptRole::Assistant, content.clone()),
                EntryContent::Correction { reason } => (
                    PromptRole::User,
                    format!(
                        "Your previous reply was rejected: {reason}\nReply again with exactly one valid JSON object."
                    ),
                ),
                EntryContent::ToolCall { name, arguments } => (
                    PromptRole::Assistant,
                    json!({ "action": "tool", "name": name, "arguments": arguments }).to_string(),
                ),
                EntryContent::ToolResult { name, result } => (
                    PromptRole::User,
                    self.render_observation(name, result, tools.get(name)),
                ),
                EntryContent::AgentResponse { content } => (
                    PromptRole::Assistant,
                    json!({ "action": "respond", "text": content }).to_string(),
                ),
            };
            push_turn(&mut turns, role, content);
        }
        turns
    }

    fn render_observation(&self, name: &str, result: &ToolResult, spec: Option<&ToolSpec>) -> String {
        match result {
            ToolResult::Success { payload } => {
                let body = match payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!(
                    "Observation from {name} (success):\n{}",
                    truncate(&body, self.config.max_observation_chars)
                )
            }
            ToolResult::Failure { error } => {
                let mut out = format!(
                    "Observation from {name} (failed):\nError: {}\n",
                    truncate(error, self.config.max_observation_chars)
                );
                out.push_str(&failure_hints(error, spec).render());
                out.trim_end().to_string()
            }
        }
    }
}

fn render_tool(spec: &ToolSpec) -> String {
    let mut out = format!("- {}: {}\n", spec.name, spec.description.trim());
    for (name, param) in &spec.parameters {
        let required = if param.required { "required" } else { "optional" };
        out.push_str(&format!("    - {name} ({}, {required})", param.kind));
        if !param.description.is_empty() {
            out.push_str(&format!(": {}", param.description.trim()));
        }
        out.push('\n');
    }
    out
}

/// Append a turn, merging into the previous one when the role repeats.
fn push_turn(turns: &mut Vec<PromptTurn>, role: PromptRole, content: String) {
    match turns.last_mut() {
        Some(last) if last.role == role => {
            last.content.push_str("\n\n");
            last.content.push_str(&content);
        }
        _ => turns.push(PromptTurn { role, content }),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
