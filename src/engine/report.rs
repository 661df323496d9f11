use std::collections::BTreeMap;

use action_flow::{AttemptRecord, ChainOutcome};
use chrono::{DateTime, Utc};
use listing_core_types::{DraftId, LockScope};
use listing_model::FieldCommitResult;
use listing_state_center::FlowLogEntry;
use serde::{Deserialize, Serialize};
use variation_builder::BuilderReport;

/// Structured summary of one `fill_form` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub run_id: String,
    pub scope: LockScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<DraftId>,
    /// One result per field, in stage order.
    pub fields: Vec<FieldCommitResult>,
    /// Every strategy attempt, keyed by field.
    pub attempts: BTreeMap<String, Vec<AttemptRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<BuilderReport>,
    /// The builder ran in another context.
    pub delegated: bool,
    /// The submit control was clicked.
    pub submit_attempted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Diagnostics log of the scope as persisted at the end of the run.
    pub log: Vec<FlowLogEntry>,
}

impl FillReport {
    pub(crate) fn new(run_id: String, scope: LockScope, draft_id: Option<DraftId>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            scope,
            draft_id,
            fields: Vec::new(),
            attempts: BTreeMap::new(),
            builder: None,
            delegated: false,
            submit_attempted: false,
            started_at: now,
            finished_at: now,
            log: Vec::new(),
        }
    }

    pub(crate) fn push_chain(&mut self, outcome: &ChainOutcome) -> FieldCommitResult {
        let result = outcome.to_result();
        self.attempts.insert(outcome.field.clone(), outcome.attempts.clone());
        self.fields.push(result.clone());
        result
    }

    pub(crate) fn push(&mut self, result: FieldCommitResult) {
        self.fields.push(result);
    }

    pub fn field(&self, name: &str) -> Option<&FieldCommitResult> {
        self.fields.iter().find(|result| result.field == name)
    }

    pub fn committed(&self, name: &str) -> Option<bool> {
        self.field(name).map(|result| result.committed)
    }

    /// Field name -> committed.
    pub fn summary(&self) -> BTreeMap<String, bool> {
        self.fields
            .iter()
            .map(|result| (result.field.clone(), result.committed))
            .collect()
    }

    pub fn failed_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|result| !result.committed)
            .map(|result| result.field.as_str())
            .collect()
    }

    pub fn all_committed(&self) -> bool {
        self.fields.iter().all(|result| result.committed)
    }
}
