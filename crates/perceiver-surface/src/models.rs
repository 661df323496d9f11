use action_primitives::DocumentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Plain,
    Builder,
    PricingGrid,
}

/// Relative weight of each builder signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub headline: f64,
    pub panel_labels: f64,
    pub add_action: f64,
    pub continue_action: f64,
    pub url_pattern: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            headline: 0.3,
            panel_labels: 0.2,
            add_action: 0.2,
            continue_action: 0.15,
            url_pattern: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub weights: SignalWeights,
    /// Builder classification needs at least this score plus an interactive signal.
    pub builder_threshold: f64,
    pub grid_threshold: f64,
    /// Scores this far below a threshold count as ambiguous.
    pub ambiguity_band: f64,
    /// Minimum visible area (px²) of a dialog shell around an unreadable builder.
    pub shell_min_area: f64,
    pub url_patterns: Vec<String>,
    pub headline_phrases: Vec<String>,
    pub panel_labels: Vec<String>,
    pub add_labels: Vec<String>,
    pub continue_labels: Vec<String>,
    pub price_headers: Vec<String>,
    pub quantity_headers: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            weights: SignalWeights::default(),
            builder_threshold: 0.5,
            grid_threshold: 0.6,
            ambiguity_band: 0.2,
            shell_min_area: 120_000.0,
            url_patterns: strings(&[r"(?i)/msku", r"(?i)variation", r"(?i)/lstng/.*var"]),
            headline_phrases: strings(&[
                "create variations",
                "manage variations",
                "add variations",
                "variation details",
                "select attributes",
            ]),
            panel_labels: strings(&["attributes", "options", "values", "selected", "attribute"]),
            add_labels: strings(&["add", "+ add", "create your own", "add option", "add attribute"]),
            continue_labels: strings(&["continue", "next", "save and continue", "done"]),
            price_headers: strings(&["price"]),
            quantity_headers: strings(&["quantity", "qty", "available"]),
        }
    }
}

/// Builder signals observed in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub headline: bool,
    pub panel_labels: bool,
    pub add_action: bool,
    pub continue_action: bool,
    pub url_pattern: bool,
    pub grid_price_header: bool,
    pub grid_quantity_header: bool,
    pub grid_rows: usize,
}

impl Signals {
    pub fn interactive(&self) -> bool {
        self.add_action || self.continue_action
    }
}

/// Scores for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    pub document: DocumentId,
    pub signals: Signals,
    pub builder_score: f64,
    pub grid_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub surface: Surface,
    pub confidence: f64,
    /// Document holding the surface (the unreadable one for shell detections).
    pub document: Option<DocumentId>,
    pub signals: Option<Signals>,
    /// Detected through a same-origin dialog shell around an unreadable document.
    pub via_shell: bool,
    /// No classification cleared its threshold by a clear margin; best guess.
    pub ambiguous: bool,
}

impl Detection {
    pub fn plain(confidence: f64, document: Option<DocumentId>) -> Self {
        Self {
            surface: Surface::Plain,
            confidence,
            document,
            signals: None,
            via_shell: false,
            ambiguous: false,
        }
    }

    pub fn is(&self, surface: Surface) -> bool {
        self.surface == surface
    }
}
