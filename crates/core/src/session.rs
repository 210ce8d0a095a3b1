//! Session and transcript domain types.
//!
//! A session is the append-only record of one conversation: user messages,
//! the agent's thoughts, tool calls with their results, corrections, and
//! final responses. Entries are never removed or rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;
use crate::tool::{Arguments, ToolResult};

/// Unique identifier for a session (conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    AgentThought,
    Correction,
    ToolCall,
    ToolResult,
    AgentResponse,
}

/// The payload of a transcript entry, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum EntryContent {
    /// The end user's message
    User { content: String },

    /// Model output that was not itself a decision (prose, or rejected output)
    AgentThought { content: String },

    /// Why the previous model output was rejected
    Correction { reason: String },

    /// A tool invocation about to be dispatched
    ToolCall { name: String, arguments: Arguments },

    /// The observation for the immediately preceding tool call
    ToolResult { name: String, result: ToolResult },

    /// The final answer for a request
    AgentResponse { content: String },
}

impl EntryContent {
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::AgentThought { .. } => Role::AgentThought,
            Self::Correction { .. } => Role::Correction,
            Self::ToolCall { .. } => Role::ToolCall,
            Self::ToolResult { .. } => Role::ToolResult,
            Self::AgentResponse { .. } => Role::AgentResponse,
        }
    }
}

/// A single timestamped transcript record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub content: EntryContent,
}

impl TranscriptEntry {
    pub fn new(content: EntryContent) -> Self {
        Self {
            timestamp: Utc::now(),
            content,
        }
    }

    pub fn role(&self) -> Role {
        self.content.role()
    }
}

/// A conversation: an ordered, append-only transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    entries: Vec<TranscriptEntry>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session with a fresh id.
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a session from persisted entries, re-checking the tool-call pairing.
    pub fn restore(
        id: SessionId,
        entries: Vec<TranscriptEntry>,
    ) -> std::result::Result<Self, TranscriptError> {
        let mut session = Self::with_id(id);
        if let Some(first) = entries.first() {
            session.created_at = first.timestamp;
        }
        for entry in entries {
            session.push(entry)?;
        }
        Ok(session)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tool call still waiting for its result, if any.
    pub fn pending_tool_call(&self) -> Option<&str> {
        match self.entries.last().map(|e| &e.content) {
            Some(EntryContent::ToolCall { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Append an entry, enforcing the tool-call/tool-result pairing.
    pub fn push(&mut self, entry: TranscriptEntry) -> std::result::Result<(), TranscriptError> {
        match (self.pending_tool_call(), &entry.content) {
            (Some(expected), EntryContent::ToolResult { name, .. }) if expected != name => {
                return Err(TranscriptError::MismatchedToolResult {
                    expected: expected.to_string(),
                    got: name.clone(),
                });
            }
            (Some(_), EntryContent::ToolResult { .. }) => {}
            (Some(pending), _) => {
                return Err(TranscriptError::PendingToolCall {
                    pending: pending.to_string(),
                });
            }
            (None, EntryContent::ToolResult { name, .. }) => {
                return Err(TranscriptError::OrphanToolResult { tool: name.clone() });
            }
            (None, _) => {}
        }
        self.updated_at = entry.timestamp.max(self.updated_at);
        self.entries.push(entry);
        Ok(())
    }

    /// Append freshly created content.
    pub fn append(&mut self, content: EntryContent) -> std::result::Result<(), TranscriptError> {
        self.push(TranscriptEntry::new(content))
    }

    /// Entries appended at or after `index` (what one request added).
    pub fn entries_since(&self, index: usize) -> &[TranscriptEntry] {
        &self.entries[index.min(self.entries.len())..]
    }

    /// The most recent user message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match &e.content {
            EntryContent::User { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that every tool call is immediately followed by exactly one tool result.
///
/// A trailing unanswered tool call is also a violation.
pub fn check_pairing(entries: &[TranscriptEntry]) -> std::result::Result<(), TranscriptError> {
    let mut pending: Option<&str> = None;
    for entry in entries {
        match (&entry.content, pending) {
            (EntryContent::ToolResult { name, .. }, Some(expected)) => {
                if name != expected {
                    return Err(TranscriptError::MismatchedToolResult {
                        expected: expected.to_string(),
                        got: name.clone(),
                    });
                }
                pending = None;
            }
            (EntryContent::ToolResult { name, .. }, None) => {
                return Err(TranscriptError::OrphanToolResult { tool: name.clone() });
            }
            (_, Some(expected)) => {
                return Err(TranscriptError::PendingToolCall {
                    pending: expected.to_string(),
                });
            }
            (EntryContent::ToolCall { name, .. }, None) => pending = Some(name),
            (_, None) => {}
        }
    }
    match pending {
        Some(p) => Err(TranscriptError::PendingToolCall {
            pending: p.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> EntryContent {
        EntryContent::ToolCall {
            name: name.into(),
            arguments: Arguments::new(),
        }
    }

    fn result(name: &str) -> EntryContent {
        EntryContent::ToolResult {
            name: name.into(),
            result: ToolResult::success(json!({})),
        }
    }

    #[test]
    fn tool_call_requires_result_next() {
        let mut session = Session::new();
        session.append(EntryContent::User { content: "hi".into() }).unwrap();
        session.append(call("list_emails")).unwrap();

        let err = session
            .append(EntryContent::AgentThought { content: "hmm".into() })
            .unwrap_err();
        assert!(matches!(err, TranscriptError::PendingToolCall { .. }));

        session.append(result("list_emails")).unwrap();
        session
            .append(EntryContent::AgentThought { content: "ok".into() })
            .unwrap();
        assert_eq!(session.len(), 4);
        assert!(check_pairing(session.entries()).is_ok());
    }

    #[test]
    fn orphan_and_mismatched_results_rejected() {
        let mut session = Session::new();
        assert!(matches!(
            session.append(result("x")).unwrap_err(),
            TranscriptError::OrphanToolResult { .. }
        ));

        session.append(call("a")).unwrap();
        assert!(matches!(
            session.append(result("b")).unwrap_err(),
            TranscriptError::MismatchedToolResult { .. }
        ));
    }

    #[test]
    fn check_pairing_flags_trailing_call() {
        let entries = vec![TranscriptEntry::new(call("send_email"))];
        assert!(check_pairing(&entries).is_err());
    }

    #[test]
    fn entry_serializes_with_role_tag() {
        let entry = TranscriptEntry::new(EntryContent::AgentResponse {
            content: "Done".into(),
        });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""role":"agent_response""#));
        assert!(json.contains("timestamp"));

        let back: TranscriptEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role(), Role::AgentResponse);
    }

    #[test]
    fn restore_rejects_broken_transcript() {
        let entries = vec![
            TranscriptEntry::new(call("a")),
            TranscriptEntry::new(EntryContent::User { content: "x".into() }),
        ];
        assert!(Session::restore(SessionId::from("s1"), entries).is_err());
    }

    #[test]
    fn entries_since_clamps() {
        let mut session = Session::new();
        session.append(EntryContent::User { content: "a".into() }).unwrap();
        assert_eq!(session.entries_since(0).len(), 1);
        assert!(session.entries_since(5).is_empty());
        assert_eq!(session.last_user_message(), Some("a"));
    }
}
