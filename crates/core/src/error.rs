//! Error types for the ToolPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ToolPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Reasoning backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Session storage errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Transcript invariant violations ---
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the reasoning backend transport.
///
/// `Unavailable` covers connection failures and timeouts; the other variants
/// cover a reachable backend that answered with something unusable.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend request failed: {message} (status: {status_code})")]
    Status { status_code: u16, message: String },

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// True when the failure came from the network layer rather than the backend itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Failures of the tool gateway that are not attributable to the tool itself.
///
/// Remote tool failures (auth expiry, rate limits, bad arguments) are *not*
/// errors: they come back as [`crate::tool::ToolResult::Failure`].
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed gateway response: {0}")]
    Protocol(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session id '{0}'")]
    InvalidId(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted session {session_id}: {reason}")]
    Corrupted { session_id: String, reason: String },
}

/// Violations of the append-only transcript rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("tool call '{pending}' must be followed by its tool result before any other entry")]
    PendingToolCall { pending: String },

    #[error("tool result for '{tool}' has no preceding tool call")]
    OrphanToolResult { tool: String },

    #[error("tool result for '{got}' does not answer pending call '{expected}'")]
    MismatchedToolResult { expected: String, got: String },
}
