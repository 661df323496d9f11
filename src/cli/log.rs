use anyhow::{Context, Result};
use clap::Args;
use listing_core_types::LockScope;
use listing_state_center::load_flow_log;

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone)]
pub struct LogArgs {
    /// Scope key, e.g. `draft:123` or `page:host/path`
    #[arg(long)]
    pub scope: String,

    /// Show only the most recent entries
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

pub async fn cmd_log(args: LogArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.store(false).await?;
    let scope = LockScope(args.scope.clone());
    let mut entries = load_flow_log(store.as_ref(), &scope)
        .await
        .with_context(|| format!("Failed to load diagnostics log of {scope}"))?;
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if print_structured(&entries, ctx.output())? {
        return Ok(());
    }
    if entries.is_empty() {
        println!("No diagnostics recorded for {scope}");
        return Ok(());
    }
    for entry in &entries {
        let at = chrono::DateTime::from_timestamp_millis(entry.timestamp_ms)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| entry.timestamp_ms.to_string());
        println!("{at}  {:<28} {}", entry.step, entry.payload);
    }
    Ok(())
}
