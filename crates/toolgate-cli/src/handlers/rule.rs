//! Permission rule handlers.

use anyhow::Result;
use toolgate_core::{NewPermissionRule, PermissionRule};

use super::resolve_provider;
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_separator;
use crate::rule_commands::RuleDecision;
use crate::utils::input::prompt_confirmation;

/// Arguments of `rule add`.
pub struct AddArgs {
    pub decision: RuleDecision,
    pub tool: Option<String>,
    pub pattern: Option<String>,
    pub provider: Option<String>,
    pub priority: i64,
}

fn decision_label(rule: &PermissionRule) -> &'static str {
    if rule.auto_approve { "allow" } else { "deny" }
}

pub async fn list(ctx: &CliContext) -> Result<()> {
    let rules = ctx.permissions.list_rules().await.map_err(CliError::from)?;

    if rules.is_empty() {
        println!("No permission rules. Every tool call asks for approval.");
        return Ok(());
    }

    println!("{:<5} {:<9} {:<7} {:<50}", "ID", "Priority", "Action", "Target");
    print_separator(71);
    for rule in &rules {
        println!(
            "{:<5} {:<9} {:<7} {:<50}",
            rule.id,
            rule.priority,
            decision_label(rule),
            rule.target()
        );
    }
    println!();
    println!("Rules are evaluated top to bottom; the first match decides.");
    Ok(())
}

pub async fn add(ctx: &CliContext, args: AddArgs) -> Result<PermissionRule> {
    let auto_approve = args.decision.auto_approve();
    let mut rule = match (args.tool, args.pattern) {
        (Some(tool), None) => NewPermissionRule::for_tool(tool, auto_approve),
        (None, Some(pattern)) => NewPermissionRule::for_pattern(pattern, auto_approve),
        (None, None) => NewPermissionRule::global(auto_approve),
        (Some(_), Some(_)) => {
            return Err(
                CliError::Arguments("--tool and --pattern are mutually exclusive".into()).into(),
            );
        }
    };
    if let Some(identifier) = args.provider {
        rule = rule.on_server(resolve_provider(ctx, &identifier).await?.id);
    }
    rule = rule.with_priority(args.priority);

    let saved = ctx.permissions.create_rule(rule).await.map_err(CliError::from)?;
    println!(
        "Added rule {}: {} {} (priority {})",
        saved.id,
        decision_label(&saved),
        saved.target(),
        saved.priority
    );
    Ok(saved)
}

pub async fn remove(ctx: &CliContext, id: Option<i64>, all: bool, force: bool) -> Result<()> {
    if all {
        if !force && !prompt_confirmation("Remove every permission rule?")? {
            println!("Cancelled.");
            return Ok(());
        }
        let removed = ctx
            .permissions
            .delete_all_rules()
            .await
            .map_err(CliError::from)?;
        println!("Removed {removed} rule(s)");
        return Ok(());
    }

    let id = id.ok_or_else(|| CliError::Arguments("A rule ID or --all is required".into()))?;
    ctx.permissions.delete_rule(id).await.map_err(CliError::from)?;
    println!("Removed rule {id}");
    Ok(())
}

/// Print how a call to `tool` on `provider` would be decided.
pub async fn check(ctx: &CliContext, provider: &str, tool: &str) -> Result<bool> {
    let provider = resolve_provider(ctx, provider).await?;
    let rule = ctx
        .permissions
        .matching_rule(provider.id, tool)
        .await
        .map_err(CliError::from)?;

    let auto_approve = rule.as_ref().is_some_and(|r| r.auto_approve);
    match rule {
        Some(rule) => println!(
            "{tool} on '{}': {} (rule {}: {})",
            provider.name,
            if auto_approve { "runs without approval" } else { "asks for approval" },
            rule.id,
            rule.target()
        ),
        None => println!(
            "{tool} on '{}': asks for approval (no matching rule)",
            provider.name
        ),
    }
    Ok(auto_approve)
}
