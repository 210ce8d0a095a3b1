//! # ToolPilot Core
//!
//! Domain types, traits, and error definitions for the ToolPilot agent.
//! This crate has **zero framework dependencies**. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the reasoning loop is defined as a trait here:
//! the reasoning backend, the tool gateway, and the session store.
//! Implementations live in their respective crates, so the loop can be
//! driven by real services or by scripted test doubles alike.

pub mod backend;
pub mod error;
pub mod session;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{BackendRequest, Prompt, PromptRole, PromptTurn, ReasoningBackend, SamplingParams};
pub use error::{BackendError, Error, GatewayError, Result, SessionError, TranscriptError};
pub use session::{EntryContent, Role, Session, SessionId, TranscriptEntry, check_pairing};
pub use store::{SessionStore, SessionSummary};
pub use tool::{Arguments, ParamSpec, ParamType, ToolGateway, ToolResult, ToolSet, ToolSpec};
