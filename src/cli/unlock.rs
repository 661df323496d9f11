use anyhow::{Context, Result};
use clap::Args;
use listing_core_types::LockScope;
use serde_json::json;
use surface_lock::SurfaceLock;
use tracing::info;

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone)]
pub struct UnlockArgs {
    /// Scope whose builder lock should be dropped
    #[arg(long)]
    pub scope: String,
}

pub async fn cmd_unlock(args: UnlockArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.store(false).await?;
    let lock = SurfaceLock::new(store, ctx.config().lock.clone());
    let scope = LockScope(args.scope);
    let holder = lock.read(&scope).await.context("Failed to read lock")?;
    let released = lock
        .force_release(&scope)
        .await
        .with_context(|| format!("Failed to release lock of {scope}"))?;
    info!(scope = %scope, released, "force release requested");

    let view = json!({
        "scope": scope,
        "released": released,
        "holder": holder,
    });
    if print_structured(&view, ctx.output())? {
        return Ok(());
    }
    match holder {
        Some(record) if released => println!("Released lock of {scope} held by {}", record.owner.context_id),
        _ if released => println!("Released lock of {scope}"),
        _ => println!("No lock held for {scope}"),
    }
    Ok(())
}
