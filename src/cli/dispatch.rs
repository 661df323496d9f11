use super::axes::cmd_axes;
use super::fill::cmd_fill;
use super::log::cmd_log;
use super::revise::cmd_revise;
use super::unlock::cmd_unlock;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(command: Commands, ctx: &CliContext) -> Result<()> {
    match command {
        Commands::Fill(args) => cmd_fill(args, ctx).await,
        Commands::Axes(args) => cmd_axes(args, ctx).await,
        Commands::Log(args) => cmd_log(args, ctx).await,
        Commands::Unlock(args) => cmd_unlock(args, ctx).await,
        Commands::Revise(args) => cmd_revise(args, ctx).await,
    }
}
