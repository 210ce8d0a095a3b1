//! The ReAct loop: the heart of ToolPilot.
//!
//! The controller follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Encode** the session transcript, tool catalogue, and step budget
//! 2. **Think**: send the prompt to the reasoning backend
//! 3. **Decide**: parse the output into a response or a tool call;
//!    rejected output is fed back to the model as a correction
//! 4. **Act**: execute the tool through the gateway
//! 5. **Observe**: record the result and loop back to step 1
//!
//! The loop ends when the model responds, or when a backend, protocol,
//! gateway, or turn limit is exhausted.

pub mod controller;
pub mod hints;
pub mod parser;
pub mod protocol;
pub mod stream_event;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use controller::{FailureKind, LoopLimits, LoopOutcome, ReactController};
pub use hints::{FailureHints, failure_hints};
pub use parser::{AgentDecision, ParseFailure, ParseFailureKind, ParsedTurn, parse_output};
pub use protocol::{EncoderConfig, PromptEncoder};
pub use stream_event::AgentStreamEvent;
