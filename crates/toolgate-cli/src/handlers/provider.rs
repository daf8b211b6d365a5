//! Provider management handlers.

use anyhow::Result;
use toolgate_core::{
    NewToolProvider, ProviderEnvEntry, ProviderState, ToolProvider, ToolProviderPatch,
};

use super::resolve_provider;
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{format_optional, print_separator, truncate_string};
use crate::utils::input::prompt_confirmation;

/// Arguments of `provider add`.
pub struct AddArgs {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: Option<String>,
    pub disabled: bool,
    pub include_resources: bool,
}

/// Parse a `KEY=VALUE` pair. The value may contain further `=`.
pub fn parse_env_pair(raw: &str) -> Result<ProviderEnvEntry, CliError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok(ProviderEnvEntry::new(key.trim(), value))
        }
        _ => Err(CliError::Arguments(format!(
            "Expected KEY=VALUE for --env, got '{raw}'"
        ))),
    }
}

pub async fn list(ctx: &CliContext) -> Result<()> {
    let providers = ctx.manager.list_configs().await;

    if providers.is_empty() {
        println!("No tool providers configured.");
        println!("Add one with: toolgate provider add <name> <command> [args...]");
        return Ok(());
    }

    println!(
        "{:<5} {:<20} {:<8} {:<10} {:<40}",
        "ID", "Name", "Enabled", "Resources", "Command"
    );
    print_separator(87);

    for provider in &providers {
        let command_line = std::iter::once(provider.command.as_str())
            .chain(provider.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<5} {:<20} {:<8} {:<10} {:<40}",
            provider.id,
            truncate_string(&provider.name, 20),
            if provider.enabled { "yes" } else { "no" },
            if provider.include_resources { "yes" } else { "no" },
            truncate_string(&command_line, 40),
        );
    }

    println!();
    println!("{} provider(s)", providers.len());
    Ok(())
}

pub async fn add(ctx: &CliContext, args: AddArgs) -> Result<()> {
    let mut provider = NewToolProvider::new(args.name, args.command, args.args)
        .with_enabled(!args.disabled)
        .with_include_resources(args.include_resources);
    for raw in &args.env {
        provider.env.push(parse_env_pair(raw)?);
    }
    if let Some(cwd) = args.cwd {
        provider = provider.with_working_dir(cwd);
    }

    let saved = ctx.manager.add_config(provider).await.map_err(CliError::from)?;
    println!("Added provider '{}' (ID {})", saved.name, saved.id);

    if saved.enabled {
        print_status(ctx, &saved).await;
        ctx.manager.cleanup().await;
    }
    Ok(())
}

pub async fn remove(ctx: &CliContext, identifier: &str, force: bool) -> Result<()> {
    let provider = resolve_provider(ctx, identifier).await?;

    if !force
        && !prompt_confirmation(&format!(
            "Remove provider '{}' (ID {})?",
            provider.name, provider.id
        ))?
    {
        println!("Cancelled.");
        return Ok(());
    }

    ctx.manager
        .remove_config(provider.id)
        .await
        .map_err(CliError::from)?;
    println!("Removed provider '{}'", provider.name);
    Ok(())
}

pub async fn set_enabled(ctx: &CliContext, identifier: &str, enabled: bool) -> Result<()> {
    let provider = resolve_provider(ctx, identifier).await?;
    let updated = ctx
        .manager
        .update_config(provider.id, ToolProviderPatch::enabled(enabled))
        .await
        .map_err(CliError::from)?;

    if enabled {
        println!("Enabled provider '{}'", updated.name);
        print_status(ctx, &updated).await;
        ctx.manager.cleanup().await;
    } else {
        println!("Disabled provider '{}'", updated.name);
    }
    Ok(())
}

/// Start one provider regardless of its enabled flag and list what it exposes.
pub async fn test(ctx: &CliContext, identifier: &str) -> Result<()> {
    let provider = resolve_provider(ctx, identifier).await?;
    println!("Starting '{}'...", provider.name);

    if let Err(e) = ctx.manager.start(provider.id).await {
        return Err(CliError::from(e).into());
    }

    let outcome = describe(ctx, &provider).await;
    ctx.manager.stop(provider.id).await.map_err(CliError::from)?;
    outcome
}

async fn describe(ctx: &CliContext, provider: &ToolProvider) -> Result<()> {
    let tools = ctx
        .manager
        .get_tools_for_server(provider.id)
        .await
        .map_err(CliError::from)?;

    println!("Connected. {} tool(s):", tools.len());
    for tool in &tools {
        println!(
            "  {:<30} {}",
            tool.name,
            truncate_string(&format_optional(&tool.description, ""), 60)
        );
    }

    if provider.include_resources {
        match ctx.manager.list_resources(provider.id).await {
            Ok(resources) => {
                println!("{} resource(s):", resources.len());
                for resource in &resources {
                    println!("  {:<30} {}", resource.name, resource.uri);
                }
            }
            Err(e) => println!("Resources unavailable: {e}"),
        }
    }

    match ctx.manager.list_prompts(provider.id).await {
        Ok(prompts) if !prompts.is_empty() => {
            println!("{} prompt(s):", prompts.len());
            for prompt in &prompts {
                println!("  {}", prompt.name);
            }
        }
        Ok(_) => {}
        Err(e) => println!("Prompts unavailable: {e}"),
    }

    Ok(())
}

async fn print_status(ctx: &CliContext, provider: &ToolProvider) {
    let Some(status) = ctx.manager.get_status(provider.id) else {
        return;
    };

    match status.state {
        ProviderState::Connected => {
            let count = ctx
                .manager
                .get_tools_for_server(provider.id)
                .await
                .map(|tools| tools.len())
                .unwrap_or_default();
            println!("Status: connected, {count} tool(s)");
        }
        ProviderState::Error => {
            println!("Status: error: {}", format_optional(&status.error, "unknown"));
            if let Some(diagnostics) = status.diagnostics {
                println!();
                println!("{diagnostics}");
            }
        }
        ProviderState::Stopped => println!("Status: stopped"),
    }
}
