use action_flow::RetryPolicy;
use action_primitives::{CommitTempo, PollSpec};
use serde::{Deserialize, Serialize};

/// Visible texts the builder is navigated by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderLabels {
    pub attributes_section: Vec<String>,
    pub values_section: Vec<String>,
    pub create_attribute: Vec<String>,
    pub add: Vec<String>,
    pub continue_labels: Vec<String>,
    pub save: Vec<String>,
    pub price_headers: Vec<String>,
    pub quantity_headers: Vec<String>,
    /// Product-identifier columns; never filled, cleared when prefilled.
    pub identifier_headers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for BuilderLabels {
    fn default() -> Self {
        Self {
            attributes_section: strings(&["Attributes", "Variation attributes", "Select attributes"]),
            values_section: strings(&["Options", "Values", "Attribute values"]),
            create_attribute: strings(&["Create your own", "Add attribute", "Custom attribute"]),
            add: strings(&["Add", "+ Add", "Add option", "Save option"]),
            continue_labels: strings(&["Continue", "Next", "Save and continue"]),
            save: strings(&["Save and close", "Save", "Done"]),
            price_headers: strings(&["Price"]),
            quantity_headers: strings(&["Quantity", "Qty", "Available"]),
            identifier_headers: strings(&["sku", "upc", "ean", "isbn", "mpn", "gtin", "custom label", "product id"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Per-step retry (linear backoff, capped).
    pub retry: RetryPolicy,
    /// Wait for a page reaction after a click.
    pub step_poll: PollSpec,
    /// Wait for Save to become enabled before the toggle re-check.
    pub save_poll: PollSpec,
    pub toggle_settle_ms: u64,
    /// Axes that must end up selected for the run to count as a success.
    pub required_axes: usize,
    pub tempo: CommitTempo,
    pub labels: BuilderLabels,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            step_poll: PollSpec::new(150, 20),
            save_poll: PollSpec::new(200, 10),
            toggle_settle_ms: 120,
            required_axes: 1,
            tempo: CommitTempo::default(),
            labels: BuilderLabels::default(),
        }
    }
}

impl BuilderConfig {
    /// No waits between steps; for pages that react synchronously.
    pub fn immediate() -> Self {
        Self {
            retry: RetryPolicy::new(2, 0, 0),
            step_poll: PollSpec::new(0, 2),
            save_poll: PollSpec::new(0, 2),
            toggle_settle_ms: 0,
            tempo: CommitTempo::immediate(),
            ..Self::default()
        }
    }
}
