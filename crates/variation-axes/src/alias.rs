//! Axis name to target attribute matching.

use listing_model::TargetAttributeSpec;
use serde::{Deserialize, Serialize};

use crate::normalize::axis_key;

/// How loosely an axis matched its target attribute. Ordered tightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    Exact,
    Strict,
    Soft,
}

/// Built-in alias knowledge plus the generic attributes that must never
/// receive axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTable {
    pub entries: Vec<TargetAttributeSpec>,
    pub denylist: Vec<String>,
}

fn spec(name: &str, strict: &[&str], soft: &[&str]) -> TargetAttributeSpec {
    TargetAttributeSpec {
        name: name.to_string(),
        strict_aliases: strict.iter().map(|s| s.to_string()).collect(),
        soft_aliases: soft.iter().map(|s| s.to_string()).collect(),
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            entries: vec![
                spec(
                    "Color",
                    &["colour", "colors", "colours", "main color", "main colour"],
                    &["shade", "color family", "colour family", "finish"],
                ),
                spec(
                    "Size",
                    &["sizes", "item size"],
                    &["clothing size", "shoe size", "us shoe size", "dimensions", "fit"],
                ),
                spec(
                    "Material",
                    &["materials", "fabric"],
                    &["fabric type", "outer shell material", "upper material"],
                ),
                spec("Style", &["styles"], &["design", "pattern", "look"]),
                spec("Model", &["models"], &["compatible model", "device model", "version"]),
            ],
            denylist: ["Features", "Type", "Item Type", "Custom Bundle", "Character", "Theme"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn lower(items: &[String]) -> impl Iterator<Item = String> + '_ {
    items.iter().map(|item| axis_key(item))
}

impl AliasTable {
    /// Attribute is a generic grab-bag that must not absorb axis values.
    pub fn is_denied(&self, attribute: &str) -> bool {
        let key = axis_key(attribute);
        self.denylist.iter().any(|denied| axis_key(denied) == key)
    }

    /// Built-in entry a term belongs to, with how it belongs.
    fn canonical(&self, key: &str) -> Option<(&TargetAttributeSpec, AliasKind)> {
        self.entries.iter().find_map(|entry| {
            if axis_key(&entry.name) == key {
                Some((entry, AliasKind::Exact))
            } else if lower(&entry.strict_aliases).any(|alias| alias == key) {
                Some((entry, AliasKind::Strict))
            } else if lower(&entry.soft_aliases).any(|alias| alias == key) {
                Some((entry, AliasKind::Soft))
            } else {
                None
            }
        })
    }

    /// How an axis name relates to one target attribute, if at all.
    pub fn relation(&self, axis_name: &str, target: &TargetAttributeSpec) -> Option<AliasKind> {
        let key = axis_key(axis_name);
        let target_key = axis_key(&target.name);
        if key.is_empty() {
            return None;
        }
        if key == target_key {
            return Some(AliasKind::Exact);
        }
        if lower(&target.strict_aliases).any(|alias| alias == key) {
            return Some(AliasKind::Strict);
        }
        let direct_soft = lower(&target.soft_aliases).any(|alias| alias == key);

        let through_table = match (self.canonical(&key), self.canonical(&target_key)) {
            (Some((a, a_kind)), Some((b, b_kind))) if a.name == b.name => {
                Some(a_kind.max(b_kind).max(AliasKind::Strict))
            }
            _ => None,
        };
        match (through_table, direct_soft) {
            (Some(kind), _) => Some(kind),
            (None, true) => Some(AliasKind::Soft),
            (None, false) => None,
        }
    }

    /// Tightest-matching available attribute for an axis, skipping denied
    /// and already claimed attributes. Ties keep the offered order.
    pub fn best_match<'a>(
        &self,
        axis_name: &str,
        available: &'a [TargetAttributeSpec],
        claimed: &[String],
    ) -> Option<(&'a TargetAttributeSpec, AliasKind)> {
        available
            .iter()
            .filter(|target| !self.is_denied(&target.name))
            .filter(|target| !claimed.iter().any(|name| axis_key(name) == axis_key(&target.name)))
            .filter_map(|target| self.relation(axis_name, target).map(|kind| (target, kind)))
            .min_by_key(|(_, kind)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(names: &[&str]) -> Vec<TargetAttributeSpec> {
        names.iter().map(|name| TargetAttributeSpec::named(*name)).collect()
    }

    #[test]
    fn british_spelling_is_strict() {
        let table = AliasTable::default();
        let available = targets(&["Size", "Color"]);
        let (found, kind) = table.best_match("Colour", &available, &[]).unwrap();
        assert_eq!(found.name, "Color");
        assert_eq!(kind, AliasKind::Strict);
    }

    #[test]
    fn exact_beats_soft() {
        let table = AliasTable::default();
        let available = targets(&["Shoe Size", "Size"]);
        let (found, kind) = table.best_match("Size", &available, &[]).unwrap();
        assert_eq!(found.name, "Size");
        assert_eq!(kind, AliasKind::Exact);

        let sizes = targets(&["Size"]);
        let (found, kind) = table.best_match("Shoe Size", &sizes, &[]).unwrap();
        assert_eq!(found.name, "Size");
        assert_eq!(kind, AliasKind::Soft);
    }

    #[test]
    fn denylisted_attributes_never_match() {
        let table = AliasTable::default();
        assert!(table.is_denied("item type"));
        assert!(table.best_match("Type", &targets(&["Type", "Item Type"]), &[]).is_none());
    }

    #[test]
    fn claimed_attributes_are_skipped() {
        let table = AliasTable::default();
        let available = targets(&["Color"]);
        assert!(table.best_match("Colour", &available, &["Color".into()]).is_none());
    }

    #[test]
    fn target_side_aliases_count() {
        let table = AliasTable::default();
        let mut scent = TargetAttributeSpec::named("Fragrance");
        scent.strict_aliases.push("Scent".into());
        assert_eq!(table.relation("scent", &scent), Some(AliasKind::Strict));
        assert_eq!(table.relation("Flavor", &scent), None);
    }
}
