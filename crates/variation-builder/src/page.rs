//! Read-only view of the builder as currently rendered.
//!
//! The builder is navigated by visible structure rather than fixed ids:
//! sections are found by their accessible label or first heading, chips are
//! button-like elements carrying a pressed/selected/checked state, axis tabs
//! are `role=tab`, and the pricing grid is the table whose headers name a
//! price column.

use action_locator::{FlatDom, LocatorError};
use action_primitives::{DocumentId, DomPort, ElementInfo, ElementRef};

use crate::config::BuilderLabels;
use crate::grid::is_identifier_header;

pub(crate) fn norm(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn label_matches(text: &str, labels: &[String]) -> bool {
    let text = norm(text);
    !text.is_empty()
        && labels.iter().any(|label| {
            let label = norm(label);
            text == label || text.starts_with(&format!("{label} "))
        })
}

/// Selectable chip (attribute, axis value) or tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Chip {
    pub element: ElementRef,
    pub label: String,
    pub selected: bool,
    pub enabled: bool,
}

impl Chip {
    pub fn is(&self, label: &str) -> bool {
        norm(&self.label) == norm(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub text: String,
    pub input: Option<ElementRef>,
    /// Raw value of the cell input, if any.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub element: ElementRef,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridTable {
    pub headers: Vec<String>,
    pub price_column: Option<usize>,
    pub quantity_column: Option<usize>,
    pub identifier_columns: Vec<usize>,
    pub rows: Vec<GridRow>,
}

impl GridTable {
    fn is_data_column(&self, column: usize) -> bool {
        Some(column) != self.price_column
            && Some(column) != self.quantity_column
            && !self.identifier_columns.contains(&column)
    }

    /// Descriptive cell texts per row, as used for SKU matching.
    pub fn row_texts(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .enumerate()
                    .filter(|(column, cell)| self.is_data_column(*column) && cell.input.is_none())
                    .map(|(_, cell)| cell.text.clone())
                    .filter(|text| !text.trim().is_empty())
                    .collect()
            })
            .collect()
    }

    pub fn input_at(&self, row: usize, column: Option<usize>) -> Option<&ElementRef> {
        let column = column?;
        self.rows.get(row)?.cells.get(column)?.input.as_ref()
    }
}

pub struct BuilderPage {
    dom: FlatDom,
}

impl BuilderPage {
    pub async fn read(port: &dyn DomPort, documents: &[DocumentId]) -> Result<Self, LocatorError> {
        Ok(Self {
            dom: FlatDom::collect(port, documents).await?,
        })
    }

    pub fn from_dom(dom: FlatDom) -> Self {
        Self { dom }
    }

    pub fn dom(&self) -> &FlatDom {
        &self.dom
    }

    fn children(&self, parent: &ElementRef) -> Vec<&ElementInfo> {
        self.dom
            .elements()
            .iter()
            .filter(|info| self.dom.parent(&info.element) == Some(parent))
            .collect()
    }

    fn within<'a>(&'a self, root: Option<&'a ElementRef>) -> Box<dyn Iterator<Item = &'a ElementInfo> + 'a> {
        match root {
            Some(root) => Box::new(self.dom.descendants(root)),
            None => Box::new(self.dom.elements().iter()),
        }
    }

    fn heading_of(&self, container: &ElementRef) -> Option<String> {
        self.dom
            .descendants(container)
            .find(|info| {
                matches!(info.tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "legend")
                    || info.role() == Some("heading")
            })
            .map(|info| info.text.clone())
    }

    /// Deepest visible container labelled by one of `labels`.
    pub fn section(&self, labels: &[String]) -> Option<ElementRef> {
        self.dom
            .elements()
            .iter()
            .filter(|info| info.visible)
            .filter(|info| {
                matches!(info.tag.as_str(), "section" | "fieldset" | "form" | "div" | "ul")
                    || matches!(info.role(), Some("group") | Some("region") | Some("tabpanel") | Some("listbox"))
            })
            .filter(|info| {
                let label = info
                    .attr("aria-label")
                    .map(str::to_string)
                    .or_else(|| self.heading_of(&info.element));
                label.is_some_and(|label| label_matches(&label, labels))
            })
            .filter(|info| {
                self.dom.descendants(&info.element).any(|inner| {
                    inner.is_tag("button") || inner.role() == Some("button") || inner.is_text_entry()
                })
            })
            .max_by_key(|info| self.dom.depth(&info.element))
            .map(|info| info.element.clone())
    }

    /// Visible tab panel, or the section labelled by `labels`.
    pub fn values_panel(&self, labels: &[String]) -> Option<ElementRef> {
        self.dom
            .elements()
            .iter()
            .find(|info| info.visible && info.role() == Some("tabpanel"))
            .map(|info| info.element.clone())
            .or_else(|| self.section(labels))
    }

    fn chip_of(info: &ElementInfo) -> Option<Chip> {
        let state = info
            .attr("aria-pressed")
            .or_else(|| info.attr("aria-selected"))
            .or_else(|| info.attr("aria-checked"))?;
        let button_like = info.is_tag("button")
            || matches!(
                info.role(),
                Some("button") | Some("option") | Some("checkbox") | Some("switch") | Some("tab")
            );
        if !button_like || !info.visible {
            return None;
        }
        let label = info
            .attr("aria-label")
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(info.text.as_str())
            .trim()
            .to_string();
        Some(Chip {
            element: info.element.clone(),
            label,
            selected: state == "true",
            enabled: info.enabled,
        })
    }

    /// Chips below `root` (the whole page when `None`), tabs excluded.
    pub fn chips(&self, root: Option<&ElementRef>) -> Vec<Chip> {
        self.within(root)
            .filter(|info| info.role() != Some("tab"))
            .filter_map(Self::chip_of)
            .collect()
    }

    pub fn tabs(&self) -> Vec<Chip> {
        self.dom
            .elements()
            .iter()
            .filter(|info| info.role() == Some("tab"))
            .filter_map(Self::chip_of)
            .collect()
    }

    pub fn button<'a>(&'a self, root: Option<&'a ElementRef>, labels: &[String]) -> Option<&'a ElementInfo> {
        self.within(root)
            .filter(|info| info.visible)
            .filter(|info| {
                info.is_tag("button")
                    || info.role() == Some("button")
                    || matches!(info.input_type(), Some("button") | Some("submit"))
            })
            .filter(|info| Self::chip_of(info).is_none())
            .find(|info| {
                let text = if info.text.trim().is_empty() {
                    info.attr("aria-label").or_else(|| info.attr("value")).unwrap_or_default()
                } else {
                    info.text.as_str()
                };
                let text = norm(text);
                labels.iter().any(|label| norm(label) == text)
            })
    }

    pub fn text_entry<'a>(&'a self, root: Option<&'a ElementRef>) -> Option<&'a ElementInfo> {
        self.within(root).find(|info| info.visible && info.is_text_entry())
    }

    pub fn file_input<'a>(&'a self, root: Option<&'a ElementRef>) -> Option<&'a ElementInfo> {
        self.within(root).find(|info| info.input_type() == Some("file"))
    }

    pub fn checked_toggles(&self, root: Option<&ElementRef>) -> Vec<ElementRef> {
        self.within(root)
            .filter(|info| info.visible && info.checked == Some(true))
            .filter(|info| {
                matches!(info.input_type(), Some("checkbox")) || matches!(info.role(), Some("switch") | Some("checkbox"))
            })
            .map(|info| info.element.clone())
            .collect()
    }

    fn cells_of(&self, row: &ElementRef) -> Vec<&ElementInfo> {
        self.children(row)
            .into_iter()
            .filter(|cell| {
                matches!(cell.tag.as_str(), "td" | "th")
                    || matches!(cell.role(), Some("cell") | Some("gridcell") | Some("columnheader"))
            })
            .collect()
    }

    fn is_header_cell(info: &ElementInfo) -> bool {
        info.is_tag("th") || info.role() == Some("columnheader")
    }

    /// The first visible table whose header row names a price column.
    pub fn grid(&self, labels: &BuilderLabels) -> Option<GridTable> {
        let tables = self
            .dom
            .elements()
            .iter()
            .filter(|info| info.visible && (info.is_tag("table") || info.role() == Some("grid")));
        for table in tables {
            let rows: Vec<&ElementInfo> = self
                .dom
                .descendants(&table.element)
                .filter(|info| info.is_tag("tr") || info.role() == Some("row"))
                .collect();
            let Some(header_row) = rows
                .iter()
                .find(|row| {
                    let cells = self.cells_of(&row.element);
                    !cells.is_empty() && cells.iter().all(|cell| Self::is_header_cell(cell))
                })
            else {
                continue;
            };
            let headers: Vec<String> = self
                .cells_of(&header_row.element)
                .iter()
                .map(|cell| cell.text.trim().to_string())
                .collect();
            let column = |wanted: &[String]| {
                headers
                    .iter()
                    .position(|header| wanted.iter().any(|w| norm(header).contains(&norm(w))))
            };
            let price_column = column(&labels.price_headers);
            if price_column.is_none() {
                continue;
            }
            let quantity_column = column(&labels.quantity_headers);
            let identifier_columns = headers
                .iter()
                .enumerate()
                .filter(|(_, header)| is_identifier_header(header, &labels.identifier_headers))
                .map(|(idx, _)| idx)
                .collect();

            let data_rows = rows
                .iter()
                .filter(|row| row.element != header_row.element && row.visible)
                .map(|row| GridRow {
                    element: row.element.clone(),
                    cells: self
                        .cells_of(&row.element)
                        .into_iter()
                        .map(|cell| {
                            let input = self
                                .dom
                                .descendants(&cell.element)
                                .find(|info| info.is_text_entry());
                            GridCell {
                                text: if input.is_some() { String::new() } else { cell.text.trim().to_string() },
                                input: input.map(|info| info.element.clone()),
                                value: input.and_then(|info| info.value.clone()),
                            }
                        })
                        .collect(),
                })
                .filter(|row| !row.cells.is_empty())
                .collect();

            return Some(GridTable {
                headers,
                price_column,
                quantity_column,
                identifier_columns,
                rows: data_rows,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::snapshot::{NodeSnapshot, SnapshotDocument};

    fn chip(label: &str, pressed: bool) -> NodeSnapshot {
        NodeSnapshot::new("button")
            .attr("aria-pressed", if pressed { "true" } else { "false" })
            .text(label)
    }

    async fn page(root: NodeSnapshot) -> BuilderPage {
        let doc = SnapshotDocument::single("https://shop.test/msku", root);
        BuilderPage::read(&doc, &[]).await.unwrap()
    }

    #[tokio::test]
    async fn finds_labelled_section_and_chips() {
        let page = page(NodeSnapshot::new("body").children([
            NodeSnapshot::new("section").children([
                NodeSnapshot::new("h3").text("Attributes"),
                chip("Color", true),
                chip("Size", false),
                NodeSnapshot::new("button").text("Create your own"),
            ]),
            NodeSnapshot::new("section").attr("aria-label", "Options").child(chip("Red", false)),
        ]))
        .await;
        let labels = BuilderLabels::default();
        let section = page.section(&labels.attributes_section).unwrap();
        let chips = page.chips(Some(&section));
        assert_eq!(chips.len(), 2);
        assert!(chips[0].is("color") && chips[0].selected);
        assert!(!chips[1].selected);
        assert!(page.button(Some(&section), &labels.create_attribute).is_some());

        let values = page.values_panel(&labels.values_section).unwrap();
        assert_eq!(page.chips(Some(&values))[0].label, "Red");
    }

    #[tokio::test]
    async fn reads_grid_columns_and_rows() {
        let row = |size: &str, color: &str| {
            NodeSnapshot::new("tr").children([
                NodeSnapshot::new("td").text(size),
                NodeSnapshot::new("td").text(color),
                NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "UPC").value("Does not apply")),
                NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Price")),
                NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Quantity")),
            ])
        };
        let page = page(NodeSnapshot::new("body").child(NodeSnapshot::new("table").children([
            NodeSnapshot::new("tr").children(
                ["Size", "Color", "UPC", "Price", "Quantity"].map(|h| NodeSnapshot::new("th").text(h)),
            ),
            row("S", "Red"),
            row("M", "Blue"),
        ])))
        .await;
        let grid = page.grid(&BuilderLabels::default()).unwrap();
        assert_eq!(grid.price_column, Some(3));
        assert_eq!(grid.quantity_column, Some(4));
        assert_eq!(grid.identifier_columns, vec![2]);
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.row_texts(), vec![vec!["S", "Red"], vec!["M", "Blue"]]);
        assert_eq!(grid.rows[0].cells[2].value.as_deref(), Some("Does not apply"));
        assert!(grid.input_at(1, grid.price_column).is_some());
    }
}
