//! Element resolution strategies
//!
//! Six strategies in fallback order:
//! 1. Attribute - name / id / test-id
//! 2. AriaLabel - accessible label
//! 3. Placeholder
//! 4. Structural - fixed maxlength or input type
//! 5. LabelProximity - from a visible label to its control
//! 6. Text - visible text of the control

use action_primitives::ElementInfo;

use crate::flat::FlatDom;
use crate::types::{Candidate, ControlKind, LocatorStrategy, TargetSpec};

/// Strategy trait for element resolution
pub trait Strategy: Send + Sync {
    /// Candidates for `spec` among `pool`; visibility is filtered by the caller.
    fn candidates(&self, spec: &TargetSpec, dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate>;

    /// Get strategy type
    fn strategy_type(&self) -> LocatorStrategy;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

pub(crate) fn norm(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 1.0 on exact, `partial` when one contains the other, else 0.
fn text_score(hay: &str, needle: &str, partial: f64) -> f64 {
    let hay = norm(hay);
    let needle = norm(needle);
    if hay.is_empty() || needle.is_empty() {
        return 0.0;
    }
    if hay == needle {
        1.0
    } else if hay.contains(&needle) {
        partial
    } else {
        0.0
    }
}

fn best_score<'a>(hays: impl IntoIterator<Item = &'a str>, needles: &[String], partial: f64) -> f64 {
    let hays: Vec<&str> = hays.into_iter().collect();
    needles
        .iter()
        .flat_map(|needle| hays.iter().map(move |hay| text_score(hay, needle, partial)))
        .fold(0.0, f64::max)
}

fn accepted<'a>(spec: &'a TargetSpec, pool: &'a [&'a ElementInfo]) -> impl Iterator<Item = &'a ElementInfo> + 'a {
    pool.iter().copied().filter(move |info| spec.kind.accepts(info))
}

/// name / id / data-testid / autocomplete
pub struct AttributeStrategy;

impl Strategy for AttributeStrategy {
    fn candidates(&self, spec: &TargetSpec, _dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        if spec.name_hints.is_empty() {
            return Vec::new();
        }
        accepted(spec, pool)
            .filter_map(|info| {
                let hays = ["name", "id", "data-testid", "data-test", "autocomplete"]
                    .iter()
                    .filter_map(|key| info.attr(key));
                let score = best_score(hays, &spec.name_hints, 0.85);
                (score > 0.0).then(|| Candidate::new(info, LocatorStrategy::Attribute, 0.95 * score))
            })
            .collect()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Attribute
    }
}

/// aria-label, or the text of the aria-labelledby element
pub struct AriaLabelStrategy;

impl Strategy for AriaLabelStrategy {
    fn candidates(&self, spec: &TargetSpec, dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        if spec.labels.is_empty() {
            return Vec::new();
        }
        accepted(spec, pool)
            .filter_map(|info| {
                let mut hays: Vec<String> = info.attr("aria-label").map(str::to_string).into_iter().collect();
                if let Some(ids) = info.attr("aria-labelledby") {
                    hays.extend(
                        ids.split_whitespace()
                            .filter_map(|id| dom.by_id(id))
                            .map(|label| label.text.clone()),
                    );
                }
                let score = best_score(hays.iter().map(String::as_str), &spec.labels, 0.8);
                (score > 0.0).then(|| Candidate::new(info, LocatorStrategy::AriaLabel, 0.9 * score))
            })
            .collect()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::AriaLabel
    }
}

pub struct PlaceholderStrategy;

impl Strategy for PlaceholderStrategy {
    fn candidates(&self, spec: &TargetSpec, _dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        if spec.placeholders.is_empty() {
            return Vec::new();
        }
        accepted(spec, pool)
            .filter_map(|info| {
                let score = best_score(info.attr("placeholder"), &spec.placeholders, 0.85);
                (score > 0.0).then(|| Candidate::new(info, LocatorStrategy::Placeholder, 0.85 * score))
            })
            .collect()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Placeholder
    }
}

/// A fixed maxlength, or the only kind of control that can serve (file inputs).
pub struct StructuralStrategy;

impl Strategy for StructuralStrategy {
    fn candidates(&self, spec: &TargetSpec, _dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        accepted(spec, pool)
            .filter_map(|info| {
                if let Some(len) = spec.max_length {
                    let matches = info
                        .attr("maxlength")
                        .and_then(|raw| raw.trim().parse::<u32>().ok())
                        == Some(len);
                    return matches.then(|| Candidate::new(info, LocatorStrategy::Structural, 0.7));
                }
                (spec.kind == ControlKind::File)
                    .then(|| Candidate::new(info, LocatorStrategy::Structural, 0.6))
            })
            .collect()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Structural
    }
}

/// Finds visible label text, then walks to the control it describes:
/// `for=` target, the next nearby control in document order, or the closest
/// control inside one of the label's containers.
pub struct LabelProximityStrategy {
    /// How many ancestors of the label to search for a control.
    pub container_levels: usize,
    /// How far forward in document order to look past the label.
    pub forward_window: usize,
}

impl Default for LabelProximityStrategy {
    fn default() -> Self {
        Self {
            container_levels: 3,
            forward_window: 12,
        }
    }
}

const LABEL_TAGS: [&str; 9] = ["label", "span", "div", "legend", "dt", "th", "p", "h3", "h4"];

impl Strategy for LabelProximityStrategy {
    fn candidates(&self, spec: &TargetSpec, dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        if spec.labels.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<Candidate> = Vec::new();
        let controls: Vec<&ElementInfo> = accepted(spec, pool).collect();
        let labels = dom.elements().iter().filter(|info| {
            info.visible
                && LABEL_TAGS.iter().any(|tag| info.is_tag(tag))
                && info.text.len() <= 80
                && best_score([info.text.as_str()], &spec.labels, 0.0) > 0.0
        });
        for label in labels {
            let levels = self.container_levels;
            let found = label
                .attr("for")
                .and_then(|id| controls.iter().find(|c| c.attr("id") == Some(id)).copied())
                .or_else(|| {
                    controls
                        .iter()
                        .find(|c| {
                            c.dom_index > label.dom_index
                                && c.dom_index - label.dom_index <= self.forward_window
                                && dom
                                    .tree_distance(&c.element, &label.element)
                                    .map_or(false, |d| d <= levels * 2)
                        })
                        .copied()
                })
                .or_else(|| {
                    dom.ancestors(&label.element)
                        .iter()
                        .take(levels)
                        .find_map(|container| {
                            controls
                                .iter()
                                .filter(|c| dom.is_descendant(&c.element, container))
                                .min_by_key(|c| c.dom_index.abs_diff(label.dom_index))
                                .copied()
                        })
                });
            if let Some(control) = found {
                if !out.iter().any(|c| c.element == control.element) {
                    out.push(Candidate::new(control, LocatorStrategy::LabelProximity, 0.65));
                }
            }
        }
        out
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::LabelProximity
    }
}

/// Visible text (or value/aria-label for input buttons)
pub struct TextStrategy;

impl Strategy for TextStrategy {
    fn candidates(&self, spec: &TargetSpec, _dom: &FlatDom, pool: &[&ElementInfo]) -> Vec<Candidate> {
        if spec.texts.is_empty() {
            return Vec::new();
        }
        accepted(spec, pool)
            .filter_map(|info| {
                let hays = [Some(info.text.as_str()), info.attr("value"), info.attr("aria-label")];
                let score = best_score(hays.into_iter().flatten(), &spec.texts, 0.6);
                (score > 0.0).then(|| Candidate::new(info, LocatorStrategy::Text, 0.7 * score))
            })
            .collect()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Text
    }
}

/// Strategy instance for a cascade step.
pub fn strategy_for(kind: LocatorStrategy) -> Option<Box<dyn Strategy>> {
    match kind {
        LocatorStrategy::Attribute => Some(Box::new(AttributeStrategy)),
        LocatorStrategy::AriaLabel => Some(Box::new(AriaLabelStrategy)),
        LocatorStrategy::Placeholder => Some(Box::new(PlaceholderStrategy)),
        LocatorStrategy::Structural => Some(Box::new(StructuralStrategy)),
        LocatorStrategy::LabelProximity => Some(Box::new(LabelProximityStrategy::default())),
        LocatorStrategy::Text => Some(Box::new(TextStrategy)),
        LocatorStrategy::Remembered => None,
    }
}
