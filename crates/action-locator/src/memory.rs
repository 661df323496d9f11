//! Remembered anchors that correct themselves.
//!
//! After a successful resolution the locator stores a signature of the element
//! it found. Later runs try the signature first; a partial match still wins
//! when it clears the threshold and the stored signature is then refreshed from
//! the live element, so gradual markup drift is absorbed instead of breaking.

use action_primitives::ElementInfo;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::strategies::norm;
use crate::types::{Candidate, LocatorStrategy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSignature {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub text: Option<String>,
}

impl ElementSignature {
    pub fn of(info: &ElementInfo) -> Self {
        let text = norm(&info.text);
        Self {
            tag: info.tag.clone(),
            id: info.attr("id").map(str::to_string),
            name: info.attr("name").map(str::to_string),
            aria_label: info.attr("aria-label").map(str::to_string),
            placeholder: info.attr("placeholder").map(str::to_string),
            text: (!text.is_empty() && text.len() <= 60).then_some(text),
        }
    }

    /// Weighted share of stored fields the live element still carries.
    pub fn score(&self, info: &ElementInfo) -> f64 {
        if !info.is_tag(&self.tag) {
            return 0.0;
        }
        let live = ElementSignature::of(info);
        let fields = [
            (&self.id, &live.id, 0.4),
            (&self.name, &live.name, 0.3),
            (&self.aria_label, &live.aria_label, 0.15),
            (&self.placeholder, &live.placeholder, 0.1),
            (&self.text, &live.text, 0.15),
        ];
        let (total, matched) = fields
            .iter()
            .filter(|(stored, _, _)| stored.is_some())
            .fold((0.0, 0.0), |(total, matched), (stored, live, weight)| {
                let hit = if stored == live { *weight } else { 0.0 };
                (total + weight, matched + hit)
            });
        if total == 0.0 {
            0.0
        } else {
            matched / total
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub signature: ElementSignature,
    pub hits: u32,
    pub corrections: u32,
}

/// Per-target remembered signatures.
pub struct AnchorMemory {
    entries: DashMap<String, MemoryEntry>,
    min_score: f64,
}

impl Default for AnchorMemory {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl AnchorMemory {
    pub fn new(min_score: f64) -> Self {
        Self {
            entries: DashMap::new(),
            min_score,
        }
    }

    pub fn remember(&self, key: &str, info: &ElementInfo) {
        let signature = ElementSignature::of(info);
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| entry.signature = signature.clone())
            .or_insert(MemoryEntry {
                signature,
                hits: 0,
                corrections: 0,
            });
    }

    pub fn forget(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn entry(&self, key: &str) -> Option<MemoryEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Best live match for the remembered signature of `key`.
    pub fn recall(&self, key: &str, pool: &[&ElementInfo]) -> Option<Candidate> {
        let mut entry = self.entries.get_mut(key)?;
        let best = pool
            .iter()
            .map(|info| (entry.signature.score(info), *info))
            .filter(|(score, _)| *score >= self.min_score)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let Some((score, info)) = best else {
            debug!(target_key = key, "remembered anchor no longer matches");
            return None;
        };
        entry.hits += 1;
        if score < 1.0 {
            entry.signature = ElementSignature::of(info);
            entry.corrections += 1;
            info!(target_key = key, score, "remembered anchor drifted; signature refreshed");
        }
        Some(Candidate::new(info, LocatorStrategy::Remembered, score))
    }
}
