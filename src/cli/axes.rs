use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use listing_model::{in_stock_skus, ProductListingDraft, TargetAttributeSpec, VariationSku};
use serde::Serialize;
use tokio::fs;
use variation_axes::{project_skus, AxisResolver, ResolvedAxis};

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone)]
pub struct AxesArgs {
    /// Listing draft (JSON)
    #[arg(long, value_name = "FILE")]
    pub draft: PathBuf,

    /// Attribute the target form offers (repeatable)
    #[arg(long = "attribute", value_name = "NAME")]
    pub attributes: Vec<String>,
}

#[derive(Serialize)]
struct AxesView {
    axes: Vec<ResolvedAxis>,
    dropped: Vec<String>,
    skus: Vec<SkuView>,
}

#[derive(Serialize)]
struct SkuView {
    #[serde(flatten)]
    sku: VariationSku,
    listed_price: Option<f64>,
}

pub async fn cmd_axes(args: AxesArgs, ctx: &CliContext) -> Result<()> {
    let raw = fs::read_to_string(&args.draft)
        .await
        .with_context(|| format!("Failed to read draft {}", args.draft.display()))?;
    let draft = ProductListingDraft::from_json(&raw).context("Invalid listing draft")?;
    let Some(variations) = draft.variations.as_ref().filter(|_| draft.has_variations()) else {
        println!("Draft has no variations");
        return Ok(());
    };

    let available: Vec<TargetAttributeSpec> = args.attributes.iter().map(TargetAttributeSpec::named).collect();
    let resolver = AxisResolver::new(ctx.config().resolver.clone());
    let axes = resolver.resolve(&variations.axes, &available);
    let dropped = variations
        .axes
        .iter()
        .filter(|axis| !axes.iter().any(|kept| kept.source_name == axis.name))
        .map(|axis| axis.name.clone())
        .collect();
    let rule = ctx.config().pricing;
    let skus = project_skus(&in_stock_skus(&variations.skus), &axes)
        .into_iter()
        .map(|sku| SkuView {
            listed_price: rule.price_for(&sku),
            sku,
        })
        .collect();
    let view = AxesView { axes, dropped, skus };

    if print_structured(&view, ctx.output())? {
        return Ok(());
    }
    for axis in &view.axes {
        println!(
            "{:<16} -> {:<20} score {:>3}  {}",
            axis.axis.name,
            axis.target.name(),
            axis.score,
            axis.values().join(", ")
        );
    }
    for name in &view.dropped {
        println!("{name:<16} -> dropped");
    }
    println!("{} SKU(s) listed", view.skus.len());
    for sku in &view.skus {
        let combination: Vec<String> = sku.sku.specifics.iter().map(|(axis, value)| format!("{axis}={value}")).collect();
        let price = sku
            .listed_price
            .map(listing_model::format_price)
            .unwrap_or_else(|| "-".to_string());
        let stock = sku
            .sku
            .stock
            .map(|stock| stock.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  {:<32} price {:>8}  stock {}", combination.join(" "), price, stock);
    }
    Ok(())
}
