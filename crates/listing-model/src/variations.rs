use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::draft::round_cents;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationSet {
    #[serde(default)]
    pub has_variations: bool,
    #[serde(default)]
    pub axes: Vec<VariationAxis>,
    #[serde(default)]
    pub skus: Vec<VariationSku>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationAxis {
    pub name: String,
    #[serde(default)]
    pub values: Vec<AxisValue>,
}

impl VariationAxis {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|value| AxisValue::new(*value)).collect(),
        }
    }

    /// Distinct value names, case-insensitively deduplicated, first spelling wins.
    pub fn distinct_values(&self) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        let mut out = Vec::new();
        for value in &self.values {
            let trimmed = value.name.trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = trimmed.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(trimmed.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisValue {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl AxisValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
        }
    }
}

/// One concrete combination of axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationSku {
    #[serde(default)]
    pub specifics: BTreeMap<String, String>,
    /// `None` means the source did not report stock.
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Supplier cost used when no explicit price is given.
    #[serde(default, alias = "costBasis")]
    pub cost: Option<f64>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl VariationSku {
    /// Value of an axis, matched case-insensitively on the axis name.
    pub fn value_for(&self, axis: &str) -> Option<&str> {
        let wanted = axis.trim().to_lowercase();
        self.specifics
            .iter()
            .find(|(name, _)| name.trim().to_lowercase() == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Unknown stock counts as available.
    pub fn is_in_stock(&self) -> bool {
        self.stock.map(|stock| stock > 0).unwrap_or(true)
    }

    /// Quantity to list: reported stock, or `default_quantity` when unknown.
    pub fn listed_quantity(&self, default_quantity: u32) -> u32 {
        match self.stock {
            Some(stock) if stock > 0 => stock.min(u32::MAX as i64) as u32,
            Some(_) => 0,
            None => default_quantity,
        }
    }
}

/// Rule deriving a sale price from a supplier cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingRule {
    pub multiplier: f64,
    pub addend: f64,
}

impl Default for PricingRule {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            addend: 0.0,
        }
    }
}

impl PricingRule {
    /// Explicit price first, then cost-derived price.
    pub fn price_for(&self, sku: &VariationSku) -> Option<f64> {
        if let Some(price) = sku.price.filter(|price| price.is_finite() && *price > 0.0) {
            return Some(round_cents(price));
        }
        sku.cost
            .filter(|cost| cost.is_finite() && *cost > 0.0)
            .map(|cost| round_cents(cost * self.multiplier + self.addend))
    }
}

/// SKUs that stay on the listing.
///
/// Out-of-stock SKUs are dropped as soon as one sibling has stock; when none
/// has stock every SKU is kept.
pub fn in_stock_skus(skus: &[VariationSku]) -> Vec<VariationSku> {
    if skus.iter().any(VariationSku::is_in_stock) {
        skus.iter().filter(|sku| sku.is_in_stock()).cloned().collect()
    } else {
        skus.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(color: &str, stock: Option<i64>) -> VariationSku {
        VariationSku {
            specifics: BTreeMap::from([("Color".to_string(), color.to_string())]),
            stock,
            price: None,
            cost: None,
            sku: None,
        }
    }

    #[test]
    fn zero_stock_dropped_when_sibling_has_stock() {
        let skus = vec![sku("Red", Some(0)), sku("Blue", Some(4)), sku("Green", None)];
        let kept = in_stock_skus(&skus);
        let colors: Vec<_> = kept.iter().filter_map(|s| s.value_for("color")).collect();
        assert_eq!(colors, vec!["Blue", "Green"]);
    }

    #[test]
    fn all_zero_stock_keeps_everything() {
        let skus = vec![sku("Red", Some(0)), sku("Blue", Some(0))];
        assert_eq!(in_stock_skus(&skus).len(), 2);
    }

    #[test]
    fn input_is_not_mutated() {
        let skus = vec![sku("Red", Some(0)), sku("Blue", Some(1))];
        let before = skus.clone();
        let _ = in_stock_skus(&skus);
        assert_eq!(skus, before);
    }

    #[test]
    fn price_prefers_explicit_then_cost() {
        let rule = PricingRule {
            multiplier: 1.5,
            addend: 2.0,
        };
        let mut item = sku("Red", Some(1));
        item.cost = Some(10.0);
        assert_eq!(rule.price_for(&item), Some(17.0));
        item.price = Some(12.345);
        assert_eq!(rule.price_for(&item), Some(12.35));
    }

    #[test]
    fn distinct_values_dedupes_case_insensitively() {
        let axis = VariationAxis::new("Color", &["Red", "red ", "Blue", ""]);
        assert_eq!(axis.distinct_values(), vec!["Red", "Blue"]);
    }
}
