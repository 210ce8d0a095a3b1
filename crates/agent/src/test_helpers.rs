//! Scripted backend and gateway for tests and offline demos.
//!
//! [`ScriptedBackend`] replays a queue of replies and failures, recording
//! every prompt it receives. [`ScriptedGateway`] serves a fixed tool list and
//! replays queued execution results, recording every call.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use toolpilot_core::{
    Arguments, BackendError, BackendRequest, GatewayError, Prompt, ReasoningBackend, ToolGateway,
    ToolResult, ToolSpec,
};

/// One scripted backend behaviour.
#[derive(Debug, Clone)]
pub enum BackendStep {
    /// Return this raw text
    Reply(String),
    /// Fail with this error
    Fail(BackendError),
    /// Never answer (the caller's timeout fires)
    Hang,
}

/// A backend that returns a sequence of scripted steps.
///
/// When the queue runs dry the `repeat` step is used if set; otherwise the
/// call fails with `Unavailable("script exhausted")`.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<BackendStep>>,
    repeat: Option<BackendStep>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<BackendStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies with each text in order.
    pub fn replies(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| BackendStep::Reply(t.to_string())).collect())
    }

    /// Replies with the same text forever.
    pub fn always(text: &str) -> Self {
        Self::new(Vec::new()).then_repeat(BackendStep::Reply(text.into()))
    }

    pub fn then_repeat(mut self, step: BackendStep) -> Self {
        self.repeat = Some(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_step(&self) -> Option<BackendStep> {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        steps.pop_front().or_else(|| self.repeat.clone())
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt);

        match self.next_step() {
            Some(BackendStep::Reply(text)) => Ok(text),
            Some(BackendStep::Fail(err)) => Err(err),
            Some(BackendStep::Hang) => std::future::pending().await,
            None => Err(BackendError::Unavailable("script exhausted".into())),
        }
    }
}

/// A gateway with a fixed tool list and scripted execution results.
///
/// Unscripted calls succeed with `{"ok": true}`.
pub struct ScriptedGateway {
    tools: Vec<ToolSpec>,
    results: Mutex<VecDeque<Result<ToolResult, GatewayError>>>,
    calls: Mutex<Vec<(String, Arguments)>>,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Queue the next execution result.
    pub fn then(self, result: Result<ToolResult, GatewayError>) -> Self {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    /// Sleep this long inside every execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<(String, Arguments)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ToolGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, GatewayError> {
        Ok(self.tools.clone())
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> Result<ToolResult, GatewayError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), arguments.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(ToolResult::success(json!({ "ok": true }))))
    }
}

/// The email tools used throughout the loop tests.
pub fn email_tools() -> Vec<ToolSpec> {
    use toolpilot_core::ParamType;
    vec![
        ToolSpec::new("list_emails", "List recent emails in the inbox")
            .param("max_results", ParamType::Integer, true, "How many emails to return")
            .param("query", ParamType::String, false, "Search filter"),
        ToolSpec::new("send_email", "Send an email")
            .param("to", ParamType::String, true, "Recipient address")
            .param("subject", ParamType::String, false, "")
            .param("body", ParamType::String, true, "Message body"),
    ]
}
