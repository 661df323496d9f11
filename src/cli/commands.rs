use clap::Subcommand;

use super::axes::AxesArgs;
use super::fill::FillArgs;
use super::log::LogArgs;
use super::revise::ReviseArgs;
use super::unlock::UnlockArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Fill a captured listing form from a draft and submit it
    Fill(FillArgs),

    /// Show the variation axes a draft resolves to
    Axes(AxesArgs),

    /// Print the persisted diagnostics log of a scope
    Log(LogArgs),

    /// Force-release the builder lock of a scope
    Unlock(UnlockArgs),

    /// Apply an edit to a live listing
    Revise(ReviseArgs),
}
