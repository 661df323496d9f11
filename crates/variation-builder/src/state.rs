use std::fmt;

use perceiver_surface::Detection;
use serde::{Deserialize, Serialize};
use variation_axes::{AxisShape, ResolvedAxis};

use crate::grid::RowMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderState {
    Idle,
    DetectSurface,
    AlignAttributes,
    SelectAxisChip,
    ClearPresetValues,
    EnterValues,
    Continue,
    FillPriceGrid,
    ClearDisallowedIdentifierFields,
    UploadPhotos,
    SaveAndClose,
    Done,
    Failed,
}

impl BuilderState {
    pub fn name(&self) -> &'static str {
        match self {
            BuilderState::Idle => "idle",
            BuilderState::DetectSurface => "detect_surface",
            BuilderState::AlignAttributes => "align_attributes",
            BuilderState::SelectAxisChip => "select_axis_chip",
            BuilderState::ClearPresetValues => "clear_preset_values",
            BuilderState::EnterValues => "enter_values",
            BuilderState::Continue => "continue",
            BuilderState::FillPriceGrid => "fill_price_grid",
            BuilderState::ClearDisallowedIdentifierFields => "clear_identifier_fields",
            BuilderState::UploadPhotos => "upload_photos",
            BuilderState::SaveAndClose => "save_and_close",
            BuilderState::Done => "done",
            BuilderState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuilderState::Done | BuilderState::Failed)
    }
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: BuilderState,
    pub to: BuilderState,
    /// Axis the step worked on, for per-axis states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<String>,
    pub at_ms: i64,
}

/// Value dropped because it belongs to another axis's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedValue {
    pub axis: String,
    pub value: String,
    pub claimed_by: AxisShape,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridReport {
    pub reached: bool,
    pub rows: usize,
    pub filled_rows: usize,
    pub exact: usize,
    pub partial: usize,
    pub positional: usize,
    pub fallback: usize,
    pub identifiers_cleared: usize,
}

impl GridReport {
    pub fn count(&mut self, matched_by: RowMatch) {
        match matched_by {
            RowMatch::Exact => self.exact += 1,
            RowMatch::Partial => self.partial += 1,
            RowMatch::Position => self.positional += 1,
            RowMatch::Fallback => self.fallback += 1,
        }
    }

    /// Every row received a price.
    pub fn success(&self) -> bool {
        self.reached && self.rows > 0 && self.filled_rows == self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderReport {
    /// Required axes selected and at least one value entered, and the run
    /// reached `Done`. Grid results do not gate this.
    pub success: bool,
    pub final_state: BuilderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    /// The builder is open in a document this context cannot read.
    pub needs_delegation: bool,
    pub axes: Vec<ResolvedAxis>,
    pub removed_attributes: Vec<String>,
    pub axes_selected: usize,
    pub values_entered: usize,
    pub rejected_values: Vec<RejectedValue>,
    pub grid: GridReport,
    pub photos_uploaded: usize,
    pub saved: bool,
    pub transitions: Vec<Transition>,
}

impl Default for BuilderReport {
    fn default() -> Self {
        Self {
            success: false,
            final_state: BuilderState::Idle,
            failure: None,
            detection: None,
            needs_delegation: false,
            axes: Vec::new(),
            removed_attributes: Vec::new(),
            axes_selected: 0,
            values_entered: 0,
            rejected_values: Vec::new(),
            grid: GridReport::default(),
            photos_uploaded: 0,
            saved: false,
            transitions: Vec::new(),
        }
    }
}

impl BuilderReport {
    pub fn path(&self) -> Vec<BuilderState> {
        let mut path: Vec<BuilderState> = self.transitions.iter().map(|t| t.from).collect();
        if let Some(last) = self.transitions.last() {
            path.push(last.to);
        }
        path
    }
}
