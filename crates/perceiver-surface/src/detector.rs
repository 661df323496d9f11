//! Weighted-signal surface detector

use action_primitives::{DocumentInfo, DocumentOrigin, DomPort, ElementInfo, ElementRef};
use regex::Regex;
use tracing::{debug, info};

use crate::errors::{DetectError, Result};
use crate::models::*;

const MAX_SHELL_HOPS: usize = 16;

pub struct SurfaceDetector {
    config: DetectorConfig,
    url_patterns: Vec<Regex>,
}

fn norm(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_button_like(info: &ElementInfo) -> bool {
    info.is_tag("button")
        || info.role() == Some("button")
        || matches!(info.input_type(), Some("button") | Some("submit"))
        || (info.is_tag("a") && info.attributes.contains_key("href"))
}

fn button_text(info: &ElementInfo) -> String {
    let text = if info.text.is_empty() {
        info.attr("value")
            .or_else(|| info.attr("aria-label"))
            .unwrap_or_default()
    } else {
        info.text.as_str()
    };
    norm(text)
}

impl SurfaceDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let url_patterns = config
            .url_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| DetectError::Pattern {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            url_patterns,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Classifies what the viewing context currently shows.
    ///
    /// The top document and its shadow trees are scored first; when that does
    /// not clearly show a builder or grid, every readable document is scored.
    /// A result that is still near a threshold is returned as a best guess
    /// with `ambiguous` set.
    pub async fn detect(&self, port: &dyn DomPort) -> Result<Detection> {
        let docs = port.documents().await?;
        if let Some(shell) = self.detect_shell(port, &docs).await? {
            return Ok(shell);
        }

        // The viewing document stands in for the top one when the context
        // lives inside a frame.
        let top_ids: Vec<_> = docs
            .iter()
            .enumerate()
            .filter(|(idx, doc)| doc.origin.is_readable() && (*idx == 0 || doc.is_top()))
            .map(|(_, doc)| doc.id.clone())
            .collect();
        let narrow: Vec<&DocumentInfo> = docs
            .iter()
            .filter(|doc| {
                top_ids.contains(&doc.id)
                    || (doc.origin == DocumentOrigin::Shadow
                        && doc
                            .host_element
                            .as_ref()
                            .map_or(false, |host| top_ids.contains(&host.document)))
            })
            .collect();
        let first = self.decide(&self.score_documents(port, &narrow).await?);
        if first.surface != Surface::Plain && !first.ambiguous {
            return Ok(first);
        }

        let readable: Vec<&DocumentInfo> = docs.iter().filter(|doc| doc.origin.is_readable()).collect();
        if readable.len() == narrow.len() {
            return Ok(first);
        }
        debug!(documents = readable.len(), "escalating surface detection to all readable documents");
        let broad = self.decide(&self.score_documents(port, &readable).await?);
        if broad.ambiguous {
            info!(surface = ?broad.surface, confidence = broad.confidence, "surface ambiguous; proceeding with best guess");
        }
        Ok(broad)
    }

    /// Same-origin dialog hosting an unreadable document: the builder is open.
    async fn detect_shell(&self, port: &dyn DomPort, docs: &[DocumentInfo]) -> Result<Option<Detection>> {
        for doc in docs.iter().filter(|doc| doc.origin == DocumentOrigin::CrossOrigin) {
            let Some(host) = &doc.host_element else { continue };
            let Some(dialog) = self.dialog_around(port, host).await else { continue };
            if dialog.visible && dialog.rect.area() >= self.config.shell_min_area {
                info!(document = %doc.id, area = dialog.rect.area(), "builder detected through dialog shell");
                return Ok(Some(Detection {
                    surface: Surface::Builder,
                    confidence: 1.0,
                    document: Some(doc.id.clone()),
                    signals: None,
                    via_shell: true,
                    ambiguous: false,
                }));
            }
        }
        Ok(None)
    }

    async fn dialog_around(&self, port: &dyn DomPort, host: &ElementRef) -> Option<ElementInfo> {
        let mut cursor = Some(host.clone());
        let mut hops = 0;
        while let Some(el) = cursor {
            if hops > MAX_SHELL_HOPS {
                break;
            }
            let info = port.element(&el).await.ok()?;
            if info.role() == Some("dialog") || info.attr("aria-modal") == Some("true") {
                return Some(info);
            }
            cursor = info.parent.clone();
            hops += 1;
        }
        None
    }

    async fn score_documents(&self, port: &dyn DomPort, docs: &[&DocumentInfo]) -> Result<Vec<DocumentScore>> {
        let mut scores = Vec::with_capacity(docs.len());
        for doc in docs {
            let elements = port.elements(&doc.id).await?;
            scores.push(self.score(doc, &elements));
        }
        Ok(scores)
    }

    /// Signals and scores for one document's elements.
    pub fn score(&self, doc: &DocumentInfo, elements: &[ElementInfo]) -> DocumentScore {
        let cfg = &self.config;
        let visible: Vec<&ElementInfo> = elements.iter().filter(|e| e.visible).collect();
        let any_phrase = |text: &str, phrases: &[String]| {
            let text = norm(text);
            phrases.iter().any(|p| text.contains(&norm(p)))
        };

        let headline = visible.iter().any(|e| {
            (matches!(e.tag.as_str(), "h1" | "h2" | "h3" | "legend") || e.role() == Some("heading"))
                && any_phrase(&e.text, &cfg.headline_phrases)
        });
        let panel_hits = visible
            .iter()
            .filter(|e| {
                matches!(e.tag.as_str(), "h3" | "h4" | "label" | "legend" | "span" | "th")
                    && e.text.len() <= 40
            })
            .filter_map(|e| {
                let text = norm(&e.text);
                cfg.panel_labels.iter().find(|p| text == norm(p) || text.starts_with(&norm(p)))
            })
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        let buttons: Vec<String> = visible
            .iter()
            .filter(|e| is_button_like(e))
            .map(|e| button_text(e))
            .collect();
        let add_action = buttons
            .iter()
            .any(|text| cfg.add_labels.iter().any(|l| text == &norm(l) || text.starts_with(&format!("{} ", norm(l)))));
        let continue_action = buttons
            .iter()
            .any(|text| cfg.continue_labels.iter().any(|l| text == &norm(l)));
        let url_pattern = self.url_patterns.iter().any(|re| re.is_match(&doc.url));

        let headers: Vec<String> = visible
            .iter()
            .filter(|e| e.is_tag("th") || e.role() == Some("columnheader"))
            .map(|e| norm(&e.text))
            .collect();
        let header_matches = |wanted: &[String]| headers.iter().any(|h| wanted.iter().any(|w| h.contains(&norm(w))));
        let grid_price_header = header_matches(&cfg.price_headers);
        let grid_quantity_header = header_matches(&cfg.quantity_headers);
        let grid_rows = visible
            .iter()
            .filter(|e| e.is_tag("tr") || e.role() == Some("row"))
            .filter(|row| {
                elements
                    .iter()
                    .any(|e| e.is_text_entry() && e.parent.is_some() && is_within(elements, &e.element, &row.element))
            })
            .count();

        let signals = Signals {
            headline,
            panel_labels: panel_hits >= 2,
            add_action,
            continue_action,
            url_pattern,
            grid_price_header,
            grid_quantity_header,
            grid_rows,
        };
        let w = &cfg.weights;
        let total = w.headline + w.panel_labels + w.add_action + w.continue_action + w.url_pattern;
        let earned = [
            (signals.headline, w.headline),
            (signals.panel_labels, w.panel_labels),
            (signals.add_action, w.add_action),
            (signals.continue_action, w.continue_action),
            (signals.url_pattern, w.url_pattern),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<f64>();
        let builder_score = if total > 0.0 { earned / total } else { 0.0 };
        let grid_score = [
            (signals.grid_price_header, 0.35),
            (signals.grid_quantity_header, 0.35),
            (signals.grid_rows > 0, 0.3),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<f64>();

        DocumentScore {
            document: doc.id.clone(),
            signals,
            builder_score,
            grid_score,
        }
    }

    /// Picks the surface from per-document scores.
    pub fn decide(&self, scores: &[DocumentScore]) -> Detection {
        let cfg = &self.config;
        let by = |key: fn(&DocumentScore) -> f64| {
            scores
                .iter()
                .max_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(std::cmp::Ordering::Equal))
        };
        let Some(best_grid) = by(|s| s.grid_score) else {
            return Detection::plain(1.0, None);
        };
        let best_builder = by(|s| if s.signals.interactive() { s.builder_score } else { s.builder_score * 0.5 })
            .unwrap_or(best_grid);

        let detection = |surface, score: &DocumentScore, confidence: f64, ambiguous| Detection {
            surface,
            confidence,
            document: Some(score.document.clone()),
            signals: Some(score.signals.clone()),
            via_shell: false,
            ambiguous,
        };

        if best_grid.grid_score >= cfg.grid_threshold {
            return detection(Surface::PricingGrid, best_grid, best_grid.grid_score, false);
        }
        let builder_ok =
            best_builder.builder_score >= cfg.builder_threshold && best_builder.signals.interactive();
        if builder_ok {
            return detection(Surface::Builder, best_builder, best_builder.builder_score, false);
        }

        let builder_near = best_builder.builder_score >= cfg.builder_threshold - cfg.ambiguity_band;
        let grid_near = best_grid.grid_score >= cfg.grid_threshold - cfg.ambiguity_band;
        if builder_near || grid_near {
            let builder_ratio = best_builder.builder_score / cfg.builder_threshold.max(f64::EPSILON);
            let grid_ratio = best_grid.grid_score / cfg.grid_threshold.max(f64::EPSILON);
            if grid_near && grid_ratio >= builder_ratio {
                return detection(Surface::PricingGrid, best_grid, best_grid.grid_score, true);
            }
            // A builder near-miss stays a plain form; only the threshold plus
            // an interactive signal names a builder.
            return detection(Surface::Plain, best_builder, 1.0 - best_builder.builder_score, true);
        }

        let strongest = best_builder.builder_score.max(best_grid.grid_score);
        let top = scores.first().map(|s| s.document.clone());
        Detection::plain(1.0 - strongest, top)
    }
}

/// `el` is `ancestor` or one of its descendants, walking reported parents.
fn is_within(elements: &[ElementInfo], el: &ElementRef, ancestor: &ElementRef) -> bool {
    let mut cursor = Some(el.clone());
    let mut hops = 0;
    while let Some(current) = cursor {
        if &current == ancestor {
            return true;
        }
        if hops > elements.len() {
            return false;
        }
        cursor = elements
            .iter()
            .find(|e| e.element == current)
            .and_then(|e| e.parent.clone());
        hops += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::snapshot::{NodeSnapshot, SnapshotDocument};
    use action_primitives::{DocumentId, Rect};

    fn detector() -> SurfaceDetector {
        SurfaceDetector::new(DetectorConfig::default()).unwrap()
    }

    fn builder_panel() -> NodeSnapshot {
        NodeSnapshot::new("body").children([
            NodeSnapshot::new("h2").text("Create variations"),
            NodeSnapshot::new("h3").text("Attributes"),
            NodeSnapshot::new("h3").text("Options"),
            NodeSnapshot::new("button").text("+ Add"),
            NodeSnapshot::new("button").text("Continue"),
        ])
    }

    #[tokio::test]
    async fn plain_form_is_plain() {
        let page = SnapshotDocument::single(
            "https://shop.test/sell/create",
            NodeSnapshot::new("body").children([
                NodeSnapshot::new("h1").text("Create your listing"),
                NodeSnapshot::new("input").attr("name", "title"),
                NodeSnapshot::new("button").text("List it"),
            ]),
        );
        let found = detector().detect(&page).await.unwrap();
        assert_eq!(found.surface, Surface::Plain);
        assert!(!found.ambiguous);
    }

    #[tokio::test]
    async fn builder_needs_an_interactive_signal() {
        let page = SnapshotDocument::single("https://shop.test/msku/edit", builder_panel());
        let found = detector().detect(&page).await.unwrap();
        assert_eq!(found.surface, Surface::Builder);
        assert!(found.confidence >= 0.5);

        let descriptive = SnapshotDocument::single(
            "https://shop.test/msku/help",
            NodeSnapshot::new("body").children([
                NodeSnapshot::new("h2").text("Create variations"),
                NodeSnapshot::new("h3").text("Attributes"),
                NodeSnapshot::new("h3").text("Options"),
            ]),
        );
        let found = detector().detect(&descriptive).await.unwrap();
        assert_ne!(found.surface, Surface::Builder);
    }

    #[test]
    fn near_miss_without_interaction_is_plain_and_ambiguous() {
        let detector = detector();
        let signals = Signals {
            headline: true,
            panel_labels: true,
            url_pattern: true,
            ..Signals::default()
        };
        let score = DocumentScore {
            document: DocumentId("main".into()),
            signals,
            builder_score: detector.config().builder_threshold + 0.2,
            grid_score: 0.0,
        };
        let found = detector.decide(&[score]);
        assert_eq!(found.surface, Surface::Plain);
        assert!(found.ambiguous);
        assert_eq!(found.document.unwrap().0, "main");
    }

    #[tokio::test]
    async fn pricing_grid_outranks_builder_signals() {
        let page = SnapshotDocument::single(
            "https://shop.test/msku/edit",
            NodeSnapshot::new("body").children([
                NodeSnapshot::new("h2").text("Create variations"),
                NodeSnapshot::new("button").text("Continue"),
                NodeSnapshot::new("table").children([
                    NodeSnapshot::new("tr").children([
                        NodeSnapshot::new("th").text("Size"),
                        NodeSnapshot::new("th").text("Price"),
                        NodeSnapshot::new("th").text("Quantity"),
                    ]),
                    NodeSnapshot::new("tr").children([
                        NodeSnapshot::new("td").text("S"),
                        NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("name", "price")),
                        NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("name", "qty")),
                    ]),
                ]),
            ]),
        );
        let found = detector().detect(&page).await.unwrap();
        assert_eq!(found.surface, Surface::PricingGrid);
        assert_eq!(found.signals.unwrap().grid_rows, 1);
    }

    #[tokio::test]
    async fn dialog_shell_proves_unreadable_builder() {
        let raw = serde_json::json!({
            "documents": [
                {"id": "main", "url": "https://shop.test/sell", "root": {"tag": "body", "children": [
                    {"tag": "div", "attrs": {"role": "dialog", "aria-modal": "true"},
                     "rect": {"x": 0.0, "y": 0.0, "width": 800.0, "height": 600.0},
                     "children": [{"tag": "iframe", "attrs": {"id": "msku"}}]}
                ]}},
                {"id": "builder", "url": "https://bulk.other.test/msku",
                 "host": {"document": "main", "element": "msku"},
                 "root": {"tag": "body"}}
            ]
        });
        let page = SnapshotDocument::from_json(&raw.to_string()).unwrap();
        let found = detector().detect(&page).await.unwrap();
        assert_eq!(found.surface, Surface::Builder);
        assert_eq!(found.confidence, 1.0);
        assert!(found.via_shell);
        assert_eq!(found.document.unwrap().0, "builder");
    }

    #[tokio::test]
    async fn framed_context_scores_its_own_document() {
        let raw = serde_json::json!({
            "documents": [
                {"id": "main", "url": "https://shop.test/sell", "root": {"tag": "body", "children": [
                    {"tag": "div", "attrs": {"role": "dialog"},
                     "rect": Rect::new(0.0, 0.0, 800.0, 600.0),
                     "children": [{"tag": "iframe", "attrs": {"id": "msku"}}]}
                ]}},
                {"id": "builder", "url": "https://bulk.other.test/msku",
                 "host": {"document": "main", "element": "msku"},
                 "root": serde_json::to_value(builder_panel()).unwrap()}
            ]
        });
        let page = SnapshotDocument::from_json(&raw.to_string()).unwrap();
        let inside = page.view_of(&DocumentId("builder".into())).unwrap();
        let found = detector().detect(&inside).await.unwrap();
        assert_eq!(found.surface, Surface::Builder);
        assert!(!found.via_shell);
        assert_eq!(found.document.unwrap().0, "builder");
    }

    #[tokio::test]
    async fn small_shell_does_not_count() {
        let raw = serde_json::json!({
            "documents": [
                {"id": "main", "url": "https://shop.test/sell", "root": {"tag": "body", "children": [
                    {"tag": "div", "attrs": {"role": "dialog"},
                     "rect": Rect::new(0.0, 0.0, 100.0, 50.0),
                     "children": [{"tag": "iframe", "attrs": {"id": "ad"}}]}
                ]}},
                {"id": "ad", "url": "https://ads.other.test/", "host": {"document": "main", "element": "ad"},
                 "root": {"tag": "body"}}
            ]
        });
        let page = SnapshotDocument::from_json(&raw.to_string()).unwrap();
        let found = detector().detect(&page).await.unwrap();
        assert!(!found.via_shell);
        assert_eq!(found.surface, Surface::Plain);
    }

    #[tokio::test]
    async fn escalates_into_same_origin_frames() {
        let raw = serde_json::json!({
            "documents": [
                {"id": "main", "url": "https://shop.test/sell", "root": {"tag": "body", "children": [
                    {"tag": "iframe", "attrs": {"id": "frame"}}
                ]}},
                {"id": "inner", "url": "https://shop.test/msku", "host": {"document": "main", "element": "frame"},
                 "root": serde_json::to_value(builder_panel()).unwrap()}
            ]
        });
        let page = SnapshotDocument::from_json(&raw.to_string()).unwrap();
        let found = detector().detect(&page).await.unwrap();
        assert_eq!(found.surface, Surface::Builder);
        assert_eq!(found.document.unwrap().0, "inner");
    }
}
