//! `toolpilot chat` — Interactive or single-message chat mode.
//!
//! The reasoning trace (thoughts, tool calls, observations, corrections) is
//! printed to stderr as it happens; replies go to stdout.

use anyhow::Context;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use toolpilot_agent::{AgentStreamEvent, LoopOutcome};
use toolpilot_core::SessionId;
use toolpilot_gateway::{Runtime, TurnReport};

const TRACE_PREVIEW_CHARS: usize = 200;

pub async fn run(
    message: Option<String>,
    session: Option<String>,
    show_trace: bool,
) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let runtime = Runtime::from_config(config)
        .await
        .context("failed to start the assistant")?;
    let session_id = session.as_deref().map(SessionId::from);

    if let Some(msg) = message {
        // Single message mode
        let report = send(&runtime, session_id, &msg, show_trace).await?;
        match &report.outcome {
            LoopOutcome::Completed { final_text, .. } => {
                println!("{}", toolpilot_tools::format_reply(final_text));
            }
            LoopOutcome::Failed { kind, detail, .. } => {
                anyhow::bail!("{kind}: {detail} (session {})", report.session_id);
            }
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ToolPilot — Interactive Mode");
    println!();
    println!("  Backend:   {}", runtime.backend.name());
    println!("  Model:     {}", runtime.config.backend.model);
    println!(
        "  Tools:     {} loaded from {}",
        runtime.controller.tools().len(),
        runtime.gateway.name()
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' to quit. Ctrl+C cancels the current request.");
    println!();

    let mut session_id = session_id.unwrap_or_else(SessionId::new);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match send(&runtime, Some(session_id.clone()), line, show_trace).await {
            Ok(report) => {
                println!();
                match &report.outcome {
                    LoopOutcome::Completed { final_text, .. } => {
                        for line in toolpilot_tools::format_reply(final_text).lines() {
                            println!("  Assistant > {line}");
                        }
                    }
                    LoopOutcome::Failed { kind, detail, .. } => {
                        eprintln!("  [{kind}] {detail}");
                    }
                }
                println!();
                session_id = report.session_id;
            }
            Err(e) => {
                eprintln!("  [Error] {e:#}");
                println!();
            }
        }

        prompt()?;
    }

    println!();
    println!("  Session saved as {session_id}");
    println!();

    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Run one message, printing the trace while the loop runs. Ctrl+C cancels
/// the request without leaving the session half-written.
async fn send(
    runtime: &Runtime,
    session_id: Option<SessionId>,
    message: &str,
    show_trace: bool,
) -> anyhow::Result<TurnReport> {
    let (tx, mut rx) = mpsc::channel::<AgentStreamEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if show_trace && let Some(line) = render_event(&event) {
                eprintln!("{line}");
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = runtime
        .sessions
        .run_turn(&runtime.controller, session_id, message, &cancel, Some(&tx))
        .await;

    interrupt.abort();
    drop(tx);
    let _ = printer.await;

    Ok(result?)
}

/// One trace line per non-terminal event.
fn render_event(event: &AgentStreamEvent) -> Option<String> {
    match event {
        AgentStreamEvent::Thought { content } => Some(format!(
            "  💭 {}",
            super::preview(content.trim(), TRACE_PREVIEW_CHARS)
        )),
        AgentStreamEvent::ToolCall { name, arguments } => Some(format!("  🔧 {name} {arguments}")),
        AgentStreamEvent::ToolResult {
            name,
            success,
            output,
        } => {
            let text = match output {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let status = if *success { "ok" } else { "failed" };
            Some(format!(
                "  📋 {name} {status}: {}",
                super::preview(&text, TRACE_PREVIEW_CHARS)
            ))
        }
        AgentStreamEvent::Correction { kind, reason } => {
            Some(format!("  ↩️  rejected ({kind}): {reason}"))
        }
        AgentStreamEvent::Done { .. } | AgentStreamEvent::Failed { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_tool_call() {
        let line = render_event(&AgentStreamEvent::ToolCall {
            name: "list_emails".into(),
            arguments: json!({"max_results": 5}),
        })
        .unwrap();
        assert!(line.contains(r#"list_emails {"max_results":5}"#));
    }

    #[test]
    fn renders_failed_result_text() {
        let line = render_event(&AgentStreamEvent::ToolResult {
            name: "send_email".into(),
            success: false,
            output: json!("rate limited"),
        })
        .unwrap();
        assert!(line.ends_with("send_email failed: rate limited"));
    }

    #[test]
    fn long_output_is_shortened() {
        let line = render_event(&AgentStreamEvent::ToolResult {
            name: "list_emails".into(),
            success: true,
            output: json!("x".repeat(1000)),
        })
        .unwrap();
        assert!(line.chars().count() < 300);
        assert!(line.ends_with('…'));
    }

    #[test]
    fn terminal_events_are_silent() {
        let done = AgentStreamEvent::Done {
            session_id: "s".into(),
            final_text: "hi".into(),
            turns: 1,
            tool_calls: 0,
        };
        assert!(render_event(&done).is_none());
    }
}
