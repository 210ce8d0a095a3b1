//! Agent-level streaming events.
//!
//! The controller emits these as the loop progresses so a presentation layer
//! (SSE endpoint, interactive CLI) can show the reasoning trace live.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by the controller during a run.
///
/// - `thought`     — prose the model wrote alongside its decision
/// - `tool_call`   — a validated tool call about to be dispatched
/// - `tool_result` — the observation recorded for that call
/// - `correction`  — a model output was rejected and the model is re-prompted
/// - `done`        — the run finished with a final answer
/// - `failed`      — the run ended without one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Thought { content: String },

    ToolCall { name: String, arguments: Value },

    ToolResult {
        name: String,
        success: bool,
        output: Value,
    },

    Correction { kind: String, reason: String },

    Done {
        session_id: String,
        final_text: String,
        turns: u32,
        tool_calls: u32,
    },

    Failed {
        session_id: String,
        kind: String,
        detail: String,
        turns: u32,
    },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Correction { .. } => "correction",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            name: "list_emails".into(),
            arguments: serde_json::json!({"max_results": 5}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"list_emails""#));
    }

    #[test]
    fn event_serialization_failed() {
        let event = AgentStreamEvent::Failed {
            session_id: "abc".into(),
            kind: "turn_budget_exhausted".into(),
            detail: "out of turns".into(),
            turns: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"failed""#));
        assert!(json.contains(r#""turns":5"#));
        assert!(event.is_terminal());
    }

    #[test]
    fn event_type_names() {
        let correction = AgentStreamEvent::Correction {
            kind: "unknown_tool".into(),
            reason: "x".into(),
        };
        assert_eq!(correction.event_type(), "correction");
        assert!(!correction.is_terminal());
        assert_eq!(
            AgentStreamEvent::Thought {
                content: "x".into()
            }
            .event_type(),
            "thought"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"thought","content":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::Thought { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
