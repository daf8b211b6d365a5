//! Tool catalog handler.

use anyhow::Result;
use toolgate_core::ProviderState;

use super::resolve_provider;
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{format_optional, print_separator, truncate_string};

pub async fn execute(ctx: &CliContext, provider: Option<&str>) -> Result<()> {
    let filter = match provider {
        Some(identifier) => Some(resolve_provider(ctx, identifier).await?.id),
        None => None,
    };

    ctx.manager.initialize().await.map_err(CliError::from)?;
    print_catalog(ctx, filter).await;
    ctx.manager.cleanup().await;
    Ok(())
}

async fn print_catalog(ctx: &CliContext, filter: Option<i64>) {
    let catalog = ctx.manager.get_all_tools().await;
    let entries: Vec<_> = catalog
        .values()
        .filter(|entry| filter.is_none_or(|id| entry.server_id == id))
        .collect();

    if entries.is_empty() {
        println!("No tools available.");
    } else {
        println!("{:<35} {:<20} {:<50}", "Tool", "Provider", "Description");
        print_separator(105);
        for entry in &entries {
            println!(
                "{:<35} {:<20} {:<50}",
                truncate_string(&entry.name, 35),
                truncate_string(&entry.server_name, 20),
                truncate_string(&format_optional(&entry.tool.description, ""), 50),
            );
        }
        println!();
        println!("{} tool(s)", entries.len());
    }

    let statuses = ctx.manager.get_all_server_statuses();
    for provider in ctx.manager.list_configs().await {
        if filter.is_some_and(|id| id != provider.id) {
            continue;
        }
        if let Some(status) = statuses.get(&provider.id) {
            if status.state == ProviderState::Error {
                eprintln!(
                    "Provider '{}' failed: {}",
                    provider.name,
                    format_optional(&status.error, "unknown error")
                );
            }
        }
    }
}
