use std::path::PathBuf;

use action_primitives::DomPort;
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use listing_core_types::{ContextRoute, DraftId};

use listing_pilot::{ReviseAction, ReviseReport};

use super::context::{read_page, CliContext};
use super::output::{print_field_line, print_structured};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReviseKind {
    Quantity,
    Price,
    End,
    ListSimilar,
    Toggle,
}

#[derive(Args, Clone)]
pub struct ReviseArgs {
    /// Captured listing page (JSON page snapshot)
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// Edit to apply
    #[arg(long, value_enum)]
    pub action: ReviseKind,

    /// New quantity or price
    #[arg(long)]
    pub value: Option<String>,

    /// Label of the toggle to set
    #[arg(long)]
    pub label: Option<String>,

    /// Switch the toggle off instead of on
    #[arg(long)]
    pub off: bool,

    /// Draft id; scopes the diagnostics log and enables remote writes
    #[arg(long)]
    pub draft_id: Option<String>,

    /// Keep logs in memory instead of the state directory
    #[arg(long)]
    pub ephemeral: bool,

    /// Skip settle delays (captured pages react synchronously)
    #[arg(long)]
    pub immediate: bool,
}

impl ReviseArgs {
    fn to_action(&self) -> Result<ReviseAction> {
        let value = || self.value.as_deref().context("--value is required for this action");
        Ok(match self.action {
            ReviseKind::Quantity => {
                ReviseAction::Quantity(value()?.trim().parse().context("--value is not a quantity")?)
            }
            ReviseKind::Price => ReviseAction::Price(value()?.trim().parse().context("--value is not a price")?),
            ReviseKind::End => ReviseAction::End,
            ReviseKind::ListSimilar => ReviseAction::ListSimilar,
            ReviseKind::Toggle => ReviseAction::Toggle {
                label: self.label.clone().context("--label is required for toggle")?,
                on: !self.off,
            },
        })
    }
}

pub async fn cmd_revise(args: ReviseArgs, ctx: &CliContext) -> Result<()> {
    let action = args.to_action()?;
    let page = read_page(&args.page).await?;
    let route = ContextRoute::top(page.location().await.context("Page has no location")?);
    let draft_id = args.draft_id.clone().map(DraftId);

    let config = ctx.run_config(args.immediate);
    let store = ctx.store(args.ephemeral).await?;
    let engine = ctx.engine(config, store)?;
    let report = engine
        .revise_listing(&page, route, draft_id.as_ref(), &action)
        .await?;

    if !print_structured(&report, ctx.output())? {
        print_human(&report);
    }
    if !report.result.committed {
        bail!("{} was not applied", report.action);
    }
    Ok(())
}

fn print_human(report: &ReviseReport) {
    println!("Revise {}", report.action);
    print_field_line(&report.result);
    println!(
        "  {} after {} attempt(s)",
        if report.saved { "saved" } else { "not saved" },
        report.attempts.len()
    );
}
