use std::collections::BTreeMap;

use listing_model::{AxisValue, TargetAttributeSpec, VariationAxis, VariationSku};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alias::{AliasKind, AliasTable};
use crate::normalize::{axis_key, is_value_concatenation, normalize_axis_name};
use crate::vocab::AxisShape;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Axes the target form handles reliably at once.
    pub max_axes: usize,
    pub min_distinct_values: usize,
    /// Value-count bonus stays below the gap between shaped and shapeless axes.
    pub value_bonus_cap: u32,
    pub aliases: AliasTable,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_axes: 2,
            min_distinct_values: 2,
            value_bonus_cap: 49,
            aliases: AliasTable::default(),
        }
    }
}

/// Where an axis lands on the target form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeTarget {
    Existing { name: String, matched_by: AliasKind },
    /// New attribute named after the axis itself.
    Custom { name: String },
}

impl AttributeTarget {
    pub fn name(&self) -> &str {
        match self {
            AttributeTarget::Existing { name, .. } | AttributeTarget::Custom { name } => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AttributeTarget::Custom { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAxis {
    /// Working copy: normalized name, distinct values.
    pub axis: VariationAxis,
    pub source_name: String,
    pub shape: Option<AxisShape>,
    pub score: u32,
    pub target: AttributeTarget,
}

impl ResolvedAxis {
    pub fn values(&self) -> Vec<String> {
        self.axis.values.iter().map(|value| value.name.clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    axis: VariationAxis,
    source_name: String,
    shape: Option<AxisShape>,
    score: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AxisResolver {
    config: ResolverConfig,
}

impl AxisResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.config.aliases
    }

    /// Normalizes, filters, dedupes and ranks `axes`, keeping at most
    /// `max_axes`. The caller's axes are not touched.
    pub fn sanitize(&self, axes: &[VariationAxis]) -> Vec<VariationAxis> {
        self.ranked(axes).into_iter().map(|c| c.axis).collect()
    }

    /// Sanitized axes matched to the attributes the target offers.
    pub fn resolve(&self, axes: &[VariationAxis], available: &[TargetAttributeSpec]) -> Vec<ResolvedAxis> {
        let mut claimed: Vec<String> = Vec::new();
        self.ranked(axes)
            .into_iter()
            .map(|candidate| {
                let target = match self.config.aliases.best_match(&candidate.axis.name, available, &claimed) {
                    Some((spec, kind)) => AttributeTarget::Existing {
                        name: spec.name.clone(),
                        matched_by: kind,
                    },
                    None => AttributeTarget::Custom {
                        name: candidate.axis.name.clone(),
                    },
                };
                claimed.push(target.name().to_string());
                debug!(axis = %candidate.axis.name, target = target.name(), custom = target.is_custom(), "axis resolved");
                ResolvedAxis {
                    axis: candidate.axis,
                    source_name: candidate.source_name,
                    shape: candidate.shape,
                    score: candidate.score,
                    target,
                }
            })
            .collect()
    }

    fn ranked(&self, axes: &[VariationAxis]) -> Vec<Candidate> {
        let mut kept: Vec<Candidate> = Vec::new();
        for source in axes {
            let name = normalize_axis_name(&source.name);
            let distinct = source.distinct_values();
            if distinct.len() < self.config.min_distinct_values {
                debug!(axis = %source.name, values = distinct.len(), "axis dropped: values do not vary");
                continue;
            }
            if is_value_concatenation(&name, &distinct) {
                debug!(axis = %source.name, "axis dropped: name concatenates its values");
                continue;
            }
            let values = distinct
                .iter()
                .map(|value| {
                    source
                        .values
                        .iter()
                        .find(|v| v.name.trim().eq_ignore_ascii_case(value))
                        .map(|v| AxisValue {
                            name: value.clone(),
                            image: v.image.clone(),
                        })
                        .unwrap_or_else(|| AxisValue::new(value.clone()))
                })
                .collect::<Vec<_>>();
            let shape = AxisShape::of(&name);
            let bonus = (values.len() as u32).min(self.config.value_bonus_cap);
            let candidate = Candidate {
                score: shape.map_or(0, |shape| shape.preference()) + bonus,
                shape,
                source_name: source.name.clone(),
                axis: VariationAxis { name, values },
            };

            let key = axis_key(&candidate.axis.name);
            match kept.iter_mut().find(|c| axis_key(&c.axis.name) == key) {
                Some(existing) if candidate.axis.values.len() > existing.axis.values.len() => {
                    debug!(axis = %key, "duplicate axis replaced by richer variant");
                    *existing = candidate;
                }
                Some(_) => debug!(axis = %key, "duplicate axis dropped"),
                None => kept.push(candidate),
            }
        }

        // Stable: equal scores keep source order.
        kept.sort_by(|a, b| b.score.cmp(&a.score));
        if kept.len() > self.config.max_axes {
            for dropped in &kept[self.config.max_axes..] {
                debug!(axis = %dropped.axis.name, score = dropped.score, "axis dropped: over the axis limit");
            }
            kept.truncate(self.config.max_axes);
        }
        kept
    }
}

/// SKUs restricted to the resolved axes and keyed by their resolved names.
///
/// Combinations that repeat once a dropped axis is gone are merged: stock
/// adds up (unknown stays unknown) and the first price wins. SKUs carrying
/// none of the resolved axes are dropped.
pub fn project_skus(skus: &[VariationSku], resolved: &[ResolvedAxis]) -> Vec<VariationSku> {
    let mut out: Vec<VariationSku> = Vec::new();
    for sku in skus {
        let specifics: BTreeMap<String, String> = resolved
            .iter()
            .filter_map(|axis| {
                sku.value_for(&axis.source_name)
                    .or_else(|| sku.value_for(&axis.axis.name))
                    .or_else(|| {
                        sku.specifics
                            .iter()
                            .find(|(name, _)| axis_key(name) == axis_key(&axis.axis.name))
                            .map(|(_, value)| value.as_str())
                    })
                    .map(|value| (axis.axis.name.clone(), value.trim().to_string()))
            })
            .collect();
        if specifics.is_empty() {
            continue;
        }
        match out.iter_mut().find(|existing| existing.specifics == specifics) {
            Some(existing) => {
                existing.stock = match (existing.stock, sku.stock) {
                    (Some(a), Some(b)) => Some(a.max(0) + b.max(0)),
                    _ => None,
                };
                existing.price = existing.price.or(sku.price);
                existing.cost = existing.cost.or(sku.cost);
            }
            None => out.push(VariationSku {
                specifics,
                ..sku.clone()
            }),
        }
    }
    out
}
