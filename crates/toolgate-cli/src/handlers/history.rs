//! Recent tool invocations.

use anyhow::Result;
use toolgate_core::ToolInvocationRecord;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{format_optional, print_separator, truncate_string};

pub async fn execute(ctx: &CliContext, session: Option<&str>, limit: u32) -> Result<()> {
    let records = ctx
        .history
        .recent(session, limit)
        .await
        .map_err(|e| CliError::Database(e.to_string()))?;

    if records.is_empty() {
        println!("No tool invocations recorded.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<30} {:<10} {:>8} {:<30}",
        "When", "Session", "Tool", "Status", "ms", "Error"
    );
    print_separator(115);
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &ToolInvocationRecord) {
    println!(
        "{:<20} {:<12} {:<30} {:<10} {:>8} {:<30}",
        record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        truncate_string(&record.session_id, 12),
        truncate_string(&record.tool_name, 30),
        record.status.as_str(),
        record.latency_ms,
        truncate_string(&format_optional(&record.error, ""), 30),
    );
}
