//! Data location report.

use anyhow::Result;
use toolgate_core::paths::DATA_DIR_ENV;

use crate::bootstrap::CliContext;

pub fn execute(ctx: &CliContext) -> Result<()> {
    println!("Database:  {}", ctx.db_path.display());
    if let Some(root) = ctx.db_path.parent().and_then(|data| data.parent()) {
        println!("Data root: {}", root.display());
    }
    println!();
    println!("Set {DATA_DIR_ENV} or pass --data-dir to use another location.");
    println!(
        "Approval timeout: {}s, rule cache TTL: {}ms, tool call timeout: {}s",
        ctx.settings.approval_timeout().as_secs(),
        ctx.settings.rule_cache_ttl().as_millis(),
        ctx.settings.tool_call_timeout().as_secs()
    );
    Ok(())
}
