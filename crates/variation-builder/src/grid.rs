//! Pricing grid row matching.
//!
//! Each rendered combination row is matched to a SKU by comparing its cell
//! texts with the SKU's axis values: exact first, then partial, then row
//! position when the grid and SKU list line up one to one, and finally the
//! single fallback price. A SKU claimed by one row is never handed to
//! another; the position pass pairs leftover rows with leftover SKUs in order.

use listing_model::{format_price, PricingRule, VariationSku};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMatch {
    Exact,
    Partial,
    Position,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowAssignment {
    pub row: usize,
    /// Index into the SKU list; `None` for fallback rows.
    pub sku: Option<usize>,
    pub matched_by: RowMatch,
    pub price: f64,
    pub quantity: u32,
}

impl RowAssignment {
    pub fn price_text(&self) -> String {
        format_price(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPricing {
    pub rule: PricingRule,
    /// Price for rows no SKU could be matched to.
    pub fallback_price: f64,
    /// Quantity for SKUs with unknown stock and for fallback rows.
    pub default_quantity: u32,
}

fn norm(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sku_values(sku: &VariationSku) -> Vec<String> {
    sku.specifics
        .values()
        .map(|value| norm(value))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Picks the single best candidate; a tie on the best score is ambiguous.
fn unique_best(scored: Vec<(usize, usize)>) -> Option<usize> {
    let best = scored.iter().map(|(_, score)| *score).max()?;
    let mut top = scored.iter().filter(|(_, score)| *score == best);
    let first = top.next()?;
    if top.next().is_some() {
        None
    } else {
        Some(first.0)
    }
}

fn exact_match(cells: &[String], skus: &[Vec<String>], claimed: &[bool]) -> Option<usize> {
    let scored = skus
        .iter()
        .enumerate()
        .filter(|(idx, values)| !claimed[*idx] && !values.is_empty())
        .filter(|(_, values)| values.iter().all(|value| cells.contains(value)))
        .map(|(idx, values)| (idx, values.len()))
        .collect();
    unique_best(scored)
}

fn partial_match(cells: &[String], skus: &[Vec<String>], claimed: &[bool]) -> Option<usize> {
    let scored = skus
        .iter()
        .enumerate()
        .filter(|(idx, values)| !claimed[*idx] && !values.is_empty())
        .filter_map(|(idx, values)| {
            let hits = values
                .iter()
                .filter(|value| {
                    cells
                        .iter()
                        .any(|cell| cell.contains(value.as_str()) || value.contains(cell.as_str()))
                })
                .count();
            (hits == values.len()).then_some((idx, hits))
        })
        .collect();
    unique_best(scored)
}

/// Assigns a price and quantity to every row.
///
/// `rows` holds the descriptive cell texts of each row in grid order; input
/// and identifier cells must already be left out.
pub fn plan_grid(rows: &[Vec<String>], skus: &[VariationSku], pricing: &GridPricing) -> Vec<RowAssignment> {
    let sku_values: Vec<Vec<String>> = skus.iter().map(sku_values).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| norm(cell)).filter(|c| !c.is_empty()).collect())
        .collect();
    let mut claimed = vec![false; skus.len()];
    let mut found: Vec<Option<(usize, RowMatch)>> = vec![None; rows.len()];

    // Exact matches claim their SKUs before any looser pass runs.
    for (row, row_cells) in cells.iter().enumerate() {
        if let Some(idx) = exact_match(row_cells, &sku_values, &claimed) {
            claimed[idx] = true;
            found[row] = Some((idx, RowMatch::Exact));
        }
    }
    for (row, row_cells) in cells.iter().enumerate() {
        if found[row].is_some() {
            continue;
        }
        if let Some(idx) = partial_match(row_cells, &sku_values, &claimed) {
            claimed[idx] = true;
            found[row] = Some((idx, RowMatch::Partial));
        }
    }
    if rows.len() == skus.len() {
        let mut leftover = (0..skus.len()).filter(|idx| !claimed[*idx]);
        for slot in found.iter_mut().filter(|slot| slot.is_none()) {
            match leftover.next() {
                Some(idx) => *slot = Some((idx, RowMatch::Position)),
                None => break,
            }
        }
    }

    found
        .into_iter()
        .enumerate()
        .map(|(row, found)| match found {
            Some((idx, matched_by)) => {
                let sku = &skus[idx];
                RowAssignment {
                    row,
                    sku: Some(idx),
                    matched_by,
                    price: pricing.rule.price_for(sku).unwrap_or(pricing.fallback_price),
                    quantity: sku.listed_quantity(pricing.default_quantity),
                }
            }
            None => RowAssignment {
                row,
                sku: None,
                matched_by: RowMatch::Fallback,
                price: pricing.fallback_price,
                quantity: pricing.default_quantity,
            },
        })
        .collect()
}

/// Header of a product-identifier column that generic values must not fill.
pub fn is_identifier_header(header: &str, identifiers: &[String]) -> bool {
    let header = norm(header);
    let words: Vec<&str> = header
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    identifiers.iter().map(|id| norm(id)).any(|id| {
        if id.contains(' ') {
            header.contains(&id)
        } else {
            words.contains(&id.as_str())
        }
    })
}

/// Value in an identifier cell that cannot be a product code: a short
/// number such as a price or quantity that landed in the wrong column.
/// Real codes (8+ digits) and "does not apply" style texts are kept.
pub fn is_disallowed_identifier(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    let numeric = value
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | ','));
    let digits = value.chars().filter(|ch| ch.is_ascii_digit()).count();
    numeric && digits > 0 && digits < 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sku(size: &str, color: &str, price: f64) -> VariationSku {
        VariationSku {
            specifics: BTreeMap::from([
                ("Size".to_string(), size.to_string()),
                ("Color".to_string(), color.to_string()),
            ]),
            stock: Some(4),
            price: Some(price),
            cost: None,
            sku: None,
        }
    }

    fn pricing() -> GridPricing {
        GridPricing {
            rule: PricingRule::default(),
            fallback_price: 19.99,
            default_quantity: 1,
        }
    }

    fn rows(cells: &[&[&str]]) -> Vec<Vec<String>> {
        cells
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn each_row_gets_its_exact_sku_price() {
        let skus = vec![sku("S", "Red", 10.0), sku("S", "Blue", 12.0), sku("M", "Red", 15.0)];
        let plan = plan_grid(&rows(&[&["S", "Red"], &["S", "Blue"], &["M", "Red"]]), &skus, &pricing());
        let prices: Vec<f64> = plan.iter().map(|a| a.price).collect();
        assert_eq!(prices, vec![10.0, 12.0, 15.0]);
        assert!(plan.iter().all(|a| a.matched_by == RowMatch::Exact));
        assert_eq!(plan[1].sku, Some(1));
    }

    #[test]
    fn rows_in_a_different_order_still_match() {
        let skus = vec![sku("S", "Red", 10.0), sku("S", "Blue", 12.0), sku("M", "Red", 15.0)];
        let plan = plan_grid(&rows(&[&["M", "Red"], &["S", "Red"], &["S", "Blue"]]), &skus, &pricing());
        let prices: Vec<f64> = plan.iter().map(|a| a.price).collect();
        assert_eq!(prices, vec![15.0, 10.0, 12.0]);
    }

    #[test]
    fn partial_then_fallback() {
        let skus = vec![sku("S", "Red", 10.0), sku("M", "Blue", 12.0)];
        let plan = plan_grid(
            &rows(&[&["Small (S)", "Red"], &["XL", "Green"], &["M", "Blue"]]),
            &skus,
            &pricing(),
        );
        assert_eq!(plan[0].matched_by, RowMatch::Partial);
        assert_eq!(plan[0].price, 10.0);
        assert_eq!(plan[1].matched_by, RowMatch::Fallback);
        assert_eq!(plan[1].price, 19.99);
        assert_eq!(plan[1].quantity, 1);
        assert_eq!(plan[2].matched_by, RowMatch::Exact);
    }

    #[test]
    fn row_position_when_text_tells_nothing() {
        let skus = vec![sku("S", "Red", 10.0), sku("M", "Red", 15.0)];
        let plan = plan_grid(&rows(&[&["Option 1"], &["Option 2"]]), &skus, &pricing());
        assert_eq!(plan[0].matched_by, RowMatch::Position);
        assert_eq!(plan[1].price, 15.0);
    }

    #[test]
    fn positional_rows_skip_a_sku_claimed_by_text() {
        let skus = vec![sku("S", "Red", 10.0), sku("M", "Red", 15.0), sku("L", "Red", 20.0)];
        let plan = plan_grid(&rows(&[&["M", "Red"], &["Option 2"], &["Option 3"]]), &skus, &pricing());
        assert_eq!(plan[0].matched_by, RowMatch::Exact);
        assert_eq!(plan[0].sku, Some(1));
        assert!(plan[1..].iter().all(|a| a.matched_by == RowMatch::Position));
        let picked: Vec<Option<usize>> = plan.iter().map(|a| a.sku).collect();
        assert_eq!(picked, vec![Some(1), Some(0), Some(2)]);
        let prices: Vec<f64> = plan.iter().map(|a| a.price).collect();
        assert_eq!(prices, vec![15.0, 10.0, 20.0]);
    }

    #[test]
    fn a_later_exact_row_keeps_its_sku_from_an_earlier_partial() {
        let skus = vec![sku("S", "Red", 10.0), sku("M", "Blue", 12.0)];
        let plan = plan_grid(&rows(&[&["Red S-M"], &["S", "Red"]]), &skus, &pricing());
        assert_eq!(plan[1].matched_by, RowMatch::Exact);
        assert_eq!(plan[1].sku, Some(0));
        assert_ne!(plan[0].sku, Some(0));
    }

    #[test]
    fn ambiguous_exact_match_is_not_taken() {
        let skus = vec![sku("S", "Red", 10.0), sku("S", "Red", 11.0), sku("M", "Red", 12.0)];
        let plan = plan_grid(&rows(&[&["S", "Red"]]), &skus, &pricing());
        assert_eq!(plan[0].matched_by, RowMatch::Fallback);
    }

    #[test]
    fn cost_basis_prices_rows() {
        let mut cheap = sku("S", "Red", 0.0);
        cheap.price = None;
        cheap.cost = Some(4.0);
        let grid = GridPricing {
            rule: PricingRule {
                multiplier: 2.0,
                addend: 0.5,
            },
            ..pricing()
        };
        let plan = plan_grid(&rows(&[&["S", "Red"]]), &[cheap], &grid);
        assert_eq!(plan[0].price_text(), "8.50");
    }

    #[test]
    fn identifier_headers() {
        let ids: Vec<String> = ["sku", "upc", "ean", "isbn", "mpn", "custom label"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(is_identifier_header("UPC", &ids));
        assert!(is_identifier_header("Custom label (SKU)", &ids));
        assert!(!is_identifier_header("Price", &ids));
        assert!(!is_identifier_header("Skull pattern", &ids));
    }

    #[test]
    fn leaked_numbers_are_disallowed_identifiers() {
        assert!(is_disallowed_identifier("3"));
        assert!(is_disallowed_identifier("12.99"));
        assert!(!is_disallowed_identifier("012345678905"));
        assert!(!is_disallowed_identifier("Does not apply"));
        assert!(!is_disallowed_identifier("  "));
    }
}
