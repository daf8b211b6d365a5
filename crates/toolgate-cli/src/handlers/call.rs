//! Tool call handler with terminal approval prompts.

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use toolgate_core::{ApprovalEvent, ApprovalRequest};
use toolgate_mcp::{ApprovalCoordinator, ToolCall};
use tracing::warn;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::utils::input::prompt_confirmation;

const TERMINAL_DECLINE_REASON: &str = "Declined at the terminal";

/// Parse `--args`, which must be a JSON object.
pub fn parse_arguments(raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CliError::Arguments(format!("--args is not valid JSON: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::Arguments("--args must be a JSON object".into()))
    }
}

/// Text blocks of a content array joined by newlines; anything else as pretty JSON.
pub fn render_output(output: &Value) -> String {
    let texts: Option<Vec<&str>> = output.as_array().and_then(|blocks| {
        blocks
            .iter()
            .map(|block| {
                (block.get("type").and_then(Value::as_str) == Some("text"))
                    .then(|| block.get("text").and_then(Value::as_str))
                    .flatten()
            })
            .collect()
    });

    match texts {
        Some(texts) if !texts.is_empty() => texts.join("\n"),
        _ => serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string()),
    }
}

pub async fn execute(ctx: &CliContext, tool: &str, args: &str, session: &str) -> Result<()> {
    let arguments = parse_arguments(args)?;

    ctx.manager.initialize().await.map_err(CliError::from)?;

    // Subscribe before executing so the request event cannot be missed.
    let events = ctx.approvals.subscribe();
    let prompter = tokio::spawn(answer_approvals(ctx.approvals.clone(), events));

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };

    let outcome = ctx
        .executor
        .execute_with_cancel(ToolCall::new(tool, arguments, session), token)
        .await;

    prompter.abort();
    interrupt.abort();
    ctx.manager.cleanup().await;

    let execution = outcome.map_err(CliError::from)?;
    if execution.auto_approved {
        eprintln!("(auto-approved by rule)");
    }
    println!("{}", render_output(&execution.output));
    eprintln!(
        "{} on provider {} took {} ms",
        execution.tool_name, execution.server_id, execution.latency_ms
    );
    Ok(())
}

async fn answer_approvals(
    approvals: ApprovalCoordinator,
    mut events: mpsc::UnboundedReceiver<ApprovalEvent>,
) {
    while let Some(event) = events.recv().await {
        let ApprovalEvent::Requested { request } = event else {
            continue;
        };

        print_request(&request);
        let approved = ask(format!("Run {}?", request.context.tool_name)).await;

        let resolved = if approved {
            approvals.approve(request.id)
        } else {
            approvals.decline(request.id, TERMINAL_DECLINE_REASON)
        };
        if !resolved {
            eprintln!("The request was already resolved.");
        }
    }
}

fn print_request(request: &ApprovalRequest) {
    println!();
    println!("Approval required");
    println!("  Tool:    {}", request.context.tool_name);
    if let Some(server_id) = request.context.server_id {
        println!("  Provider: {server_id}");
    }
    let input = serde_json::to_string_pretty(&request.context.input)
        .unwrap_or_else(|_| request.context.input.to_string());
    println!("  Input:");
    for line in input.lines() {
        println!("    {line}");
    }
}

/// Prompt on a detached thread so a pending stdin read never blocks shutdown.
async fn ask(question: String) -> bool {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(prompt_confirmation(&question));
    });

    match rx.await {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to read approval answer");
            false
        }
        Err(_) => false,
    }
}
