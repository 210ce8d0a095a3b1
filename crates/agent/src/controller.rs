//! ReAct loop controller: Thinking → Deciding → Acting → Observing.
//!
//! One run handles one user message against one session:
//!
//! ```text
//! Thinking ──► Deciding ──► Acting ──► Observing ──► Thinking ...
//!                 │
//!                 └──► Responding ──► Done
//! (any state) ──► Failed
//! ```
//!
//! - **Thinking** encodes the transcript and calls the backend, retrying
//!   transport failures with exponential backoff.
//! - **Deciding** parses the output. A rejected output is recorded as an
//!   `agent_thought` plus a `correction`, and the model is asked again.
//! - **Acting** records the `tool_call` and executes it through the gateway.
//! - **Observing** records the `tool_result`, failures included.
//! - **Responding** records the `agent_response`.
//!
//! Every Thinking→Deciding cycle counts against `max_turns`; transport
//! retries inside one Thinking step do not. A tool call is never abandoned
//! once dispatched, so the transcript always pairs calls with results.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolpilot_core::{
    Arguments, BackendError, BackendRequest, EntryContent, GatewayError, ReasoningBackend,
    SamplingParams, Session, ToolGateway, ToolResult, ToolSet,
};

use crate::parser::{AgentDecision, ParsedTurn, parse_output};
use crate::protocol::{EncoderConfig, PromptEncoder};
use crate::stream_event::AgentStreamEvent;

/// Limits and timeouts for one run.
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub max_turns: u32,
    pub max_backend_attempts: u32,
    pub max_consecutive_parse_failures: u32,
    pub max_gateway_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub backend_timeout: Duration,
    pub gateway_timeout: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_turns: 8,
            max_backend_attempts: 3,
            max_consecutive_parse_failures: 3,
            max_gateway_attempts: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            backend_timeout: Duration::from_secs(120),
            gateway_timeout: Duration::from_secs(60),
        }
    }
}

impl LoopLimits {
    pub fn from_config(config: &toolpilot_config::AppConfig) -> Self {
        let agent = &config.agent;
        Self {
            max_turns: agent.max_turns,
            max_backend_attempts: agent.max_backend_attempts,
            max_consecutive_parse_failures: agent.max_consecutive_parse_failures,
            max_gateway_attempts: agent.max_gateway_attempts,
            backoff_base: Duration::from_millis(agent.backoff_base_ms),
            backoff_max: Duration::from_millis(agent.backoff_max_ms),
            backend_timeout: config.backend.timeout(),
            gateway_timeout: config.gateway.timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based): base · 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// Why a run ended without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BackendExhausted,
    ProtocolExhausted,
    TurnBudgetExhausted,
    GatewayExhausted,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendExhausted => "backend_exhausted",
            Self::ProtocolExhausted => "protocol_exhausted",
            Self::TurnBudgetExhausted => "turn_budget_exhausted",
            Self::GatewayExhausted => "gateway_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    Completed {
        final_text: String,
        turns: u32,
        tool_calls: u32,
    },
    Failed {
        kind: FailureKind,
        detail: String,
        last_raw_text: Option<String>,
        last_tool: Option<String>,
        turns: u32,
    },
}

impl LoopOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn final_text(&self) -> Option<&str> {
        match self {
            Self::Completed { final_text, .. } => Some(final_text),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn turns(&self) -> u32 {
        match self {
            Self::Completed { turns, .. } | Self::Failed { turns, .. } => *turns,
        }
    }
}

/// Controller states. `Done` and `Failed` are terminal.
#[derive(Debug)]
enum LoopState {
    Thinking,
    Deciding { raw: String },
    Acting { tool_name: String, arguments: Arguments },
    Observing { tool_name: String, result: ToolResult },
    Responding { text: String },
    Done { final_text: String },
    Failed { kind: FailureKind, detail: String },
}

impl LoopState {
    fn name(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Deciding { .. } => "deciding",
            Self::Acting { .. } => "acting",
            Self::Observing { .. } => "observing",
            Self::Responding { .. } => "responding",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Bookkeeping for one run.
#[derive(Debug, Default)]
struct RunStats {
    turns: u32,
    tool_calls: u32,
    parse_failures: u32,
    last_raw_text: Option<String>,
    last_tool: Option<String>,
}

enum ThinkError {
    Cancelled,
    Exhausted { attempts: u32, last: BackendError },
}

/// Optional event channel. A dropped receiver is ignored.
struct EventSink<'a>(Option<&'a mpsc::Sender<AgentStreamEvent>>);

impl EventSink<'_> {
    async fn emit(&self, event: AgentStreamEvent) {
        if let Some(tx) = self.0 {
            let _ = tx.send(event).await;
        }
    }
}

/// Drives the Reason-Act-Observe loop.
///
/// Holds only shared, read-only collaborators; many runs can execute
/// concurrently on different sessions.
pub struct ReactController {
    backend: Arc<dyn ReasoningBackend>,
    gateway: Arc<dyn ToolGateway>,
    tools: Arc<ToolSet>,
    encoder: PromptEncoder,
    model: String,
    sampling: SamplingParams,
    limits: LoopLimits,
    date_stamp: bool,
}

impl ReactController {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        gateway: Arc<dyn ToolGateway>,
        tools: Arc<ToolSet>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            gateway,
            tools,
            encoder: PromptEncoder::default(),
            model: model.into(),
            sampling: SamplingParams::default(),
            limits: LoopLimits::default(),
            date_stamp: false,
        }
    }

    /// Build a controller with limits, sampling, and encoder settings from
    /// config. Prompts state the local date of each Thinking step.
    pub fn from_config(
        config: &toolpilot_config::AppConfig,
        backend: Arc<dyn ReasoningBackend>,
        gateway: Arc<dyn ToolGateway>,
        tools: Arc<ToolSet>,
    ) -> Self {
        let sampling = SamplingParams {
            temperature: config.backend.temperature,
            num_ctx: Some(config.backend.num_ctx),
            max_tokens: config.backend.max_tokens,
            json_mode: config.backend.json_mode,
        };
        let encoder = PromptEncoder::new(EncoderConfig {
            preamble: config.agent.preamble.clone(),
            max_observation_chars: config.agent.max_observation_chars,
        });

        Self::new(backend, gateway, tools, &config.backend.model)
            .with_sampling(sampling)
            .with_encoder(encoder)
            .with_limits(LoopLimits::from_config(config))
            .with_date_stamp(true)
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_encoder(mut self, encoder: PromptEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_date_stamp(mut self, enabled: bool) -> Self {
        self.date_stamp = enabled;
        self
    }

    pub fn tools(&self) -> &Arc<ToolSet> {
        &self.tools
    }

    pub fn limits(&self) -> &LoopLimits {
        &self.limits
    }

    /// Run the loop for one user message.
    ///
    /// The message and everything the run produces are appended to `session`.
    /// `Err` is returned only if the session already violates the
    /// tool-call pairing rule.
    pub async fn run(
        &self,
        session: &mut Session,
        message: &str,
        cancel: &CancellationToken,
    ) -> toolpilot_core::Result<LoopOutcome> {
        self.drive(session, message, cancel, EventSink(None)).await
    }

    /// Like [`run`](Self::run), also emitting [`AgentStreamEvent`]s.
    pub async fn run_with_events(
        &self,
        session: &mut Session,
        message: &str,
        cancel: &CancellationToken,
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> toolpilot_core::Result<LoopOutcome> {
        self.drive(session, message, cancel, EventSink(Some(events))).await
    }

    async fn drive(
        &self,
        session: &mut Session,
        message: &str,
        cancel: &CancellationToken,
        events: EventSink<'_>,
    ) -> toolpilot_core::Result<LoopOutcome> {
        session.append(EntryContent::User {
            content: message.to_string(),
        })?;

        info!(
            session = %session.id,
            model = %self.model,
            max_turns = self.limits.max_turns,
            tools = self.tools.len(),
            "ReAct loop starting"
        );

        let mut stats = RunStats::default();
        let mut state = LoopState::Thinking;

        loop {
            debug!(state = state.name(), turn = stats.turns, "Loop state");
            state = match state {
                LoopState::Thinking => self.think(session, cancel, &mut stats).await,
                LoopState::Deciding { raw } => self.decide(session, raw, &mut stats, &events).await?,
                LoopState::Acting {
                    tool_name,
                    arguments,
                } => self.act(session, tool_name, arguments, &mut stats, &events).await?,
                LoopState::Observing { tool_name, result } => {
                    Self::observe(session, tool_name, result, &events).await?;
                    LoopState::Thinking
                }
                LoopState::Responding { text } => {
                    session.append(EntryContent::AgentResponse {
                        content: text.clone(),
                    })?;
                    LoopState::Done { final_text: text }
                }
                LoopState::Done { final_text } => {
                    info!(
                        session = %session.id,
                        turns = stats.turns,
                        tool_calls = stats.tool_calls,
                        "ReAct loop completed"
                    );
                    events
                        .emit(AgentStreamEvent::Done {
                            session_id: session.id.to_string(),
                            final_text: final_text.clone(),
                            turns: stats.turns,
                            tool_calls: stats.tool_calls,
                        })
                        .await;
                    return Ok(LoopOutcome::Completed {
                        final_text,
                        turns: stats.turns,
                        tool_calls: stats.tool_calls,
                    });
                }
                LoopState::Failed { kind, detail } => {
                    warn!(session = %session.id, kind = %kind, detail = %detail, "ReAct loop failed");
                    events
                        .emit(AgentStreamEvent::Failed {
                            session_id: session.id.to_string(),
                            kind: kind.to_string(),
                            detail: detail.clone(),
                            turns: stats.turns,
                        })
                        .await;
                    return Ok(LoopOutcome::Failed {
                        kind,
                        detail,
                        last_raw_text: stats.last_raw_text,
                        last_tool: stats.last_tool,
                        turns: stats.turns,
                    });
                }
            };
        }
    }

    /// Thinking: start a cycle, encode, and call the backend.
    async fn think(
        &self,
        session: &Session,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> LoopState {
        if cancel.is_cancelled() {
            return LoopState::Failed {
                kind: FailureKind::Cancelled,
                detail: "request cancelled".into(),
            };
        }
        if stats.turns >= self.limits.max_turns {
            return LoopState::Failed {
                kind: FailureKind::TurnBudgetExhausted,
                detail: format!(
                    "turn budget of {} exhausted without a final answer",
                    self.limits.max_turns
                ),
            };
        }

        stats.turns += 1;
        let steps_left = self.limits.max_turns - stats.turns + 1;
        debug!(turn = stats.turns, steps_left, "Thinking");

        let request = BackendRequest {
            model: self.model.clone(),
            prompt: self.encoder.encode_on(
                session.entries(),
                &self.tools,
                steps_left,
                self.date_stamp.then(|| Local::now().date_naive()),
            ),
            sampling: self.sampling.clone(),
            timeout: self.limits.backend_timeout,
        };

        match self.call_backend(request, cancel).await {
            Ok(raw) => {
                stats.last_raw_text = Some(raw.clone());
                LoopState::Deciding { raw }
            }
            Err(ThinkError::Cancelled) => LoopState::Failed {
                kind: FailureKind::Cancelled,
                detail: "request cancelled while waiting for the backend".into(),
            },
            Err(ThinkError::Exhausted { attempts, last }) => LoopState::Failed {
                kind: FailureKind::BackendExhausted,
                detail: format!("backend failed {attempts} consecutive attempts: {last}"),
            },
        }
    }

    /// Call the backend with timeout, retries, and backoff. Cancellation
    /// abandons the in-flight request.
    async fn call_backend(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ThinkError> {
        let max = self.limits.max_backend_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = tokio::time::timeout(
                self.limits.backend_timeout,
                self.backend.complete(request.clone()),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ThinkError::Cancelled),
                r = call => r,
            };

            let err = match result {
                Ok(Ok(raw)) => return Ok(raw),
                Ok(Err(e)) => e,
                Err(_) => BackendError::Unavailable(format!(
                    "no response within {}s",
                    self.limits.backend_timeout.as_secs_f32()
                )),
            };

            warn!(
                backend = self.backend.name(),
                attempt,
                max,
                error = %err,
                "Backend call failed"
            );
            if attempt >= max {
                return Err(ThinkError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.limits.backoff(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ThinkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Deciding: parse the raw output, or record a correction.
    async fn decide(
        &self,
        session: &mut Session,
        raw: String,
        stats: &mut RunStats,
        events: &EventSink<'_>,
    ) -> toolpilot_core::Result<LoopState> {
        match parse_output(&raw, &self.tools) {
            Ok(ParsedTurn { decision, thought }) => {
                stats.parse_failures = 0;
                if let Some(thought) = thought {
                    session.append(EntryContent::AgentThought {
                        content: thought.clone(),
                    })?;
                    events.emit(AgentStreamEvent::Thought { content: thought }).await;
                }
                Ok(match decision {
                    AgentDecision::Respond { text } => LoopState::Responding { text },
                    AgentDecision::Invoke {
                        tool_name,
                        arguments,
                    } => LoopState::Acting {
                        tool_name,
                        arguments,
                    },
                })
            }
            Err(failure) => {
                stats.parse_failures += 1;
                warn!(
                    kind = failure.kind.as_str(),
                    reason = %failure.reason,
                    consecutive = stats.parse_failures,
                    "Model output rejected"
                );

                session.append(EntryContent::AgentThought { content: raw })?;
                session.append(EntryContent::Correction {
                    reason: failure.reason.clone(),
                })?;
                events
                    .emit(AgentStreamEvent::Correction {
                        kind: failure.kind.as_str().into(),
                        reason: failure.reason.clone(),
                    })
                    .await;

                if stats.parse_failures >= self.limits.max_consecutive_parse_failures {
                    Ok(LoopState::Failed {
                        kind: FailureKind::ProtocolExhausted,
                        detail: format!(
                            "model output rejected {} times in a row; last reason: {}",
                            stats.parse_failures, failure.reason
                        ),
                    })
                } else {
                    Ok(LoopState::Thinking)
                }
            }
        }
    }

    /// Acting: record the call and execute it. Gateway outages are retried;
    /// when they persist, a failure result is still recorded before failing.
    async fn act(
        &self,
        session: &mut Session,
        tool_name: String,
        arguments: Arguments,
        stats: &mut RunStats,
        events: &EventSink<'_>,
    ) -> toolpilot_core::Result<LoopState> {
        session.append(EntryContent::ToolCall {
            name: tool_name.clone(),
            arguments: arguments.clone(),
        })?;
        stats.tool_calls += 1;
        stats.last_tool = Some(tool_name.clone());
        events
            .emit(AgentStreamEvent::ToolCall {
                name: tool_name.clone(),
                arguments: Value::Object(arguments.clone()),
            })
            .await;

        info!(tool = %tool_name, "Executing tool");

        match self.call_gateway(&tool_name, &arguments).await {
            Ok(result) => Ok(LoopState::Observing { tool_name, result }),
            Err((attempts, err)) => {
                let result = ToolResult::failure(format!("tool gateway unavailable: {err}"));
                Self::observe(session, tool_name, result, events).await?;
                Ok(LoopState::Failed {
                    kind: FailureKind::GatewayExhausted,
                    detail: format!("tool gateway failed {attempts} consecutive attempts: {err}"),
                })
            }
        }
    }

    async fn call_gateway(
        &self,
        tool_name: &str,
        arguments: &Arguments,
    ) -> Result<ToolResult, (u32, GatewayError)> {
        let max = self.limits.max_gateway_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(
                self.limits.gateway_timeout,
                self.gateway.execute(tool_name, arguments),
            )
            .await
            {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Unavailable(format!(
                    "no response within {}s",
                    self.limits.gateway_timeout.as_secs_f32()
                )),
            };

            warn!(tool = %tool_name, attempt, max, error = %err, "Tool gateway call failed");
            if attempt >= max {
                return Err((attempt, err));
            }
            tokio::time::sleep(self.limits.backoff(attempt)).await;
        }
    }

    /// Observing: record the result verbatim.
    async fn observe(
        session: &mut Session,
        tool_name: String,
        result: ToolResult,
        events: &EventSink<'_>,
    ) -> toolpilot_core::Result<()> {
        let (success, output) = match &result {
            ToolResult::Success { payload } => (true, payload.clone()),
            ToolResult::Failure { error } => (false, Value::String(error.clone())),
        };
        session.append(EntryContent::ToolResult {
            name: tool_name.clone(),
            result,
        })?;
        events
            .emit(AgentStreamEvent::ToolResult {
                name: tool_name,
                success,
                output,
            })
            .await;
        Ok(())
    }
}
