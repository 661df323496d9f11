use std::path::PathBuf;
use std::sync::Arc;

use action_primitives::{DocumentId, DomPort};
use anyhow::{bail, Context, Result};
use clap::Args;
use listing_core_types::ContextRoute;
use listing_model::ProductListingDraft;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use listing_pilot::{BuilderAgent, BuilderBus, FillReport};

use super::context::{read_page, CliContext};
use super::output::{print_field_line, print_structured};

#[derive(Args, Clone)]
pub struct FillArgs {
    /// Listing draft (JSON)
    #[arg(long, value_name = "FILE")]
    pub draft: PathBuf,

    /// Captured listing page (JSON page snapshot)
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// Page document that renders the variation builder in its own context;
    /// a builder agent is started there
    #[arg(long, value_name = "DOCUMENT")]
    pub builder_document: Option<String>,

    /// Keep locks and logs in memory instead of the state directory
    #[arg(long)]
    pub ephemeral: bool,

    /// Skip settle delays (captured pages react synchronously)
    #[arg(long)]
    pub immediate: bool,

    /// Exit with an error when any field stays unconfirmed
    #[arg(long)]
    pub strict: bool,
}

pub async fn cmd_fill(args: FillArgs, ctx: &CliContext) -> Result<()> {
    let raw = fs::read_to_string(&args.draft)
        .await
        .with_context(|| format!("Failed to read draft {}", args.draft.display()))?;
    let draft = ProductListingDraft::from_json(&raw).context("Invalid listing draft")?;
    let page = read_page(&args.page).await?;
    let route = ContextRoute::top(page.location().await.context("Page has no location")?);

    let config = ctx.run_config(args.immediate);
    let store = ctx.store(args.ephemeral).await?;
    let mut engine = ctx.engine(config.clone(), store.clone())?;

    let shutdown = CancellationToken::new();
    let mut agent_task = None;
    if let Some(document) = &args.builder_document {
        let view = page
            .view_of(&DocumentId(document.clone()))
            .with_context(|| format!("Page has no document {document}"))?;
        let agent_route = ContextRoute::sub_document(view.location().await?);
        let peer = agent_route.context.clone();
        let agent = BuilderAgent::from_config(agent_route, Arc::new(view), store.clone(), &config)?;
        let bus = BuilderBus::new();
        agent_task = Some(agent.spawn(bus.clone(), shutdown.clone()));
        engine = engine.with_builder_agent(bus, Some(peer));
        info!("Builder agent started in document {}", document);
    }

    let report = engine.fill_form(&page, route, &draft).await?;

    shutdown.cancel();
    if let Some(task) = agent_task {
        if let Err(err) = task.await {
            warn!("Builder agent ended abnormally: {}", err);
        }
    }

    if !print_structured(&report, ctx.output())? {
        print_human(&report);
    }
    if args.strict && !report.all_committed() {
        bail!("unconfirmed fields: {}", report.failed_fields().join(", "));
    }
    Ok(())
}

fn print_human(report: &FillReport) {
    println!("Fill run {} (scope {})", report.run_id, report.scope);
    for result in &report.fields {
        print_field_line(result);
    }
    if let Some(builder) = &report.builder {
        println!(
            "  builder: {} after {} transitions; {} axes, {} values, grid {}/{}{}",
            builder.final_state,
            builder.transitions.len(),
            builder.axes_selected,
            builder.values_entered,
            builder.grid.filled_rows,
            builder.grid.rows,
            if report.delegated { " (delegated)" } else { "" }
        );
    }
    println!(
        "  submit {}",
        if report.submit_attempted { "attempted" } else { "not reached" }
    );
}
