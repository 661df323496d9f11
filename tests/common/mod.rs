#![allow(dead_code)]

use action_primitives::snapshot::{
    DocumentSnapshot, HookTrigger, HostSnapshot, NodeSnapshot, PageSnapshot, SnapshotDocument,
};
use action_primitives::Rect;
use listing_model::ProductListingDraft;
use serde_json::json;

pub const SELL_URL: &str = "https://shop.test/sell";
pub const DONE_URL: &str = "https://shop.test/sell/done";

/// Listing form controls; `List it` navigates to [`DONE_URL`].
pub fn form_controls() -> Vec<NodeSnapshot> {
    vec![
        NodeSnapshot::new("h1").text("Create your listing"),
        NodeSnapshot::new("input").id("title").attr("name", "title").attr("aria-label", "Title"),
        NodeSnapshot::new("input").id("price").attr("name", "price").attr("aria-label", "Price"),
        NodeSnapshot::new("input")
            .id("quantity")
            .attr("name", "quantity")
            .attr("aria-label", "Quantity"),
        NodeSnapshot::new("select").id("condition").attr("name", "condition").children([
            NodeSnapshot::new("option").attr("value", "1000").text("New"),
            NodeSnapshot::new("option").attr("value", "3000").text("Used"),
        ]),
        NodeSnapshot::new("textarea")
            .id("description")
            .attr("name", "description")
            .attr("aria-label", "Description"),
        NodeSnapshot::new("input")
            .id("photos")
            .attr("type", "file")
            .attr("name", "photos")
            .attr("multiple", ""),
        NodeSnapshot::new("button").id("list-it").attr("name", "submit").text("List it"),
    ]
}

fn on_submit(page: &SnapshotDocument) {
    page.on("list-it", HookTrigger::Click, |state, el| {
        state.set_url(&el.document, DONE_URL);
    });
}

pub fn plain_form() -> SnapshotDocument {
    let page = SnapshotDocument::single(SELL_URL, NodeSnapshot::new("body").children(form_controls()));
    on_submit(&page);
    page
}

fn chip(id: &str, label: &str, pressed: bool) -> NodeSnapshot {
    NodeSnapshot::new("button")
        .id(id)
        .attr("aria-pressed", if pressed { "true" } else { "false" })
        .text(label)
}

fn tab(axis: &str) -> NodeSnapshot {
    NodeSnapshot::new("button")
        .id(format!("tab-{axis}"))
        .attr("role", "tab")
        .attr("aria-selected", "false")
        .text(axis)
        .hidden()
}

fn panel(axis: &str, chips: Vec<NodeSnapshot>) -> NodeSnapshot {
    NodeSnapshot::new("div")
        .id(format!("panel-{axis}"))
        .attr("role", "tabpanel")
        .attr("aria-label", axis)
        .hidden()
        .children(chips)
        .child(
            NodeSnapshot::new("input")
                .id(format!("entry-{axis}"))
                .attr("placeholder", "Add your own"),
        )
        .child(NodeSnapshot::new("button").id(format!("add-{axis}")).text("Add"))
}

fn grid_row(size: &str, color: &str, upc: &str) -> NodeSnapshot {
    NodeSnapshot::new("tr").children([
        NodeSnapshot::new("td").text(size),
        NodeSnapshot::new("td").text(color),
        NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "UPC").value(upc)),
        NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Price")),
        NodeSnapshot::new("td").child(NodeSnapshot::new("input").attr("aria-label", "Quantity")),
    ])
}

/// Variation builder body: attribute chips, option panels, the pricing grid
/// behind Continue and a Save gated on the agreement checkbox.
pub fn builder_body() -> NodeSnapshot {
    NodeSnapshot::new("body").child(
        NodeSnapshot::new("div").id("builder").attr("role", "dialog").children([
            NodeSnapshot::new("h2").text("Create variations"),
            NodeSnapshot::new("section").id("attributes").children([
                NodeSnapshot::new("h3").text("Attributes"),
                chip("chip-color", "Color", false),
                chip("chip-size", "Size", false),
                chip("chip-type", "Type", true),
                NodeSnapshot::new("button").id("create-attr").text("Create your own"),
            ]),
            NodeSnapshot::new("h4").text("Options"),
            NodeSnapshot::new("div")
                .attr("role", "tablist")
                .children([tab("Color"), tab("Size")]),
            panel("Color", vec![chip("v-red", "Red", false), chip("v-black", "Black", true)]),
            panel("Size", vec![chip("v-s", "S", false), chip("v-m", "M", false)]),
            NodeSnapshot::new("button").id("continue").text("Continue"),
            NodeSnapshot::new("table").id("grid").hidden().children([
                NodeSnapshot::new("tr")
                    .children(["Size", "Color", "UPC", "Price", "Quantity"].map(|h| NodeSnapshot::new("th").text(h))),
                grid_row("S", "Red", "3"),
                grid_row("S", "Blue", "Does not apply"),
                grid_row("M", "Red", "012345678905"),
            ]),
            NodeSnapshot::new("label").text("Apply to all listings").child(
                NodeSnapshot::new("input")
                    .id("agree")
                    .attr("type", "checkbox")
                    .checked(true),
            ),
            NodeSnapshot::new("button")
                .id("save")
                .attr("disabled", "")
                .text("Save and close"),
        ]),
    )
}

fn script_builder(page: &SnapshotDocument) {
    page.on("*", HookTrigger::Click, |state, el| {
        if let Some(pressed) = state.attr(el, "aria-pressed") {
            state.set_attr(el, "aria-pressed", if pressed == "true" { "false" } else { "true" });
        }
    });
    for axis in ["Color", "Size"] {
        let lower = axis.to_lowercase();
        page.on(format!("chip-{lower}"), HookTrigger::Click, move |state, el| {
            let shown = state.attr(el, "aria-pressed").as_deref() == Some("true");
            if let Some(tab) = state.find(&format!("tab-{axis}")) {
                state.set_hidden(&tab, !shown);
            }
        });
        page.on(format!("tab-{axis}"), HookTrigger::Click, move |state, _| {
            for other in ["Color", "Size"] {
                if let Some(tab) = state.find(&format!("tab-{other}")) {
                    state.set_attr(&tab, "aria-selected", if other == axis { "true" } else { "false" });
                }
                if let Some(panel) = state.find(&format!("panel-{other}")) {
                    state.set_hidden(&panel, other != axis);
                }
            }
        });
        page.on(format!("add-{axis}"), HookTrigger::Click, move |state, _| {
            let (Some(entry), Some(panel)) = (
                state.find(&format!("entry-{axis}")),
                state.find(&format!("panel-{axis}")),
            ) else {
                return;
            };
            let value = state.model_value(&entry).unwrap_or_default();
            if value.is_empty() {
                return;
            }
            state.append_child(&panel, NodeSnapshot::new("button").attr("aria-pressed", "true").text(value));
            state.set_rendered_value(&entry, "");
        });
    }
    page.on("continue", HookTrigger::Click, |state, _| {
        if let Some(grid) = state.find("grid") {
            state.set_hidden(&grid, false);
        }
    });
    page.on("agree", HookTrigger::Change, |state, el| {
        let checked = state.is_checked(el).unwrap_or(false);
        if let Some(save) = state.find("save") {
            state.set_disabled(&save, !checked);
        }
    });
    page.on("save", HookTrigger::Click, |state, _| {
        if let Some(builder) = state.find("builder") {
            state.set_hidden(&builder, true);
        }
    });
}

/// Listing form whose variation builder is open in a framed document at
/// `builder_url`, shown inside a modal dialog.
pub fn framed_builder_page(builder_url: &str) -> SnapshotDocument {
    let shell = NodeSnapshot::new("div")
        .attr("role", "dialog")
        .attr("aria-modal", "true")
        .rect(Rect::new(0.0, 0.0, 800.0, 600.0))
        .child(NodeSnapshot::new("iframe").id("msku"));
    let main = NodeSnapshot::new("body").children(form_controls()).child(shell);
    let page = SnapshotDocument::from_page(PageSnapshot {
        documents: vec![
            DocumentSnapshot {
                id: "main".into(),
                url: SELL_URL.into(),
                shadow: false,
                host: None,
                root: main,
            },
            DocumentSnapshot {
                id: "builder".into(),
                url: builder_url.into(),
                shadow: false,
                host: Some(HostSnapshot {
                    document: "main".into(),
                    element: "msku".into(),
                }),
                root: builder_body(),
            },
        ],
    })
    .expect("page snapshot");
    on_submit(&page);
    script_builder(&page);
    page
}

pub fn simple_draft() -> ProductListingDraft {
    ProductListingDraft::from_json(
        &json!({
            "title": "Linen shirt",
            "price": 24.5,
            "quantity": 3,
            "condition": "New",
            "description": "Washed linen, relaxed fit.",
            "images": ["https://cdn.test/shirt-front.jpg", "https://cdn.test/shirt-back.jpg"]
        })
        .to_string(),
    )
    .expect("draft")
}

fn sku(size: &str, color: &str, price: f64, stock: i64) -> serde_json::Value {
    json!({
        "specifics": { "Size": size, "Colour": color, "Scent": "Rose" },
        "stock": stock,
        "price": price
    })
}

/// Three axes; only Colour and Size have a builder attribute to land on.
pub fn variation_draft() -> ProductListingDraft {
    ProductListingDraft::from_json(
        &json!({
            "draftId": "d-42",
            "title": "Linen shirt",
            "price": 9.99,
            "description": "Washed linen, relaxed fit.",
            "variations": {
                "hasVariations": true,
                "axes": [
                    { "name": "Colour", "values": [{ "name": "Red" }, { "name": "Blue" }, { "name": "XL" }] },
                    { "name": "Size", "values": [{ "name": "S" }, { "name": "M" }] },
                    { "name": "Scent", "values": [{ "name": "Rose" }, { "name": "Lavender" }] }
                ],
                "skus": [
                    sku("S", "Red", 10.0, 4),
                    sku("S", "Blue", 12.0, 2),
                    sku("M", "Red", 15.0, 1),
                    sku("M", "Blue", 18.0, 0)
                ]
            }
        })
        .to_string(),
    )
    .expect("draft")
}

pub fn element_id(page: &SnapshotDocument, el: &action_primitives::ElementRef) -> Option<String> {
    page.with_state(|state| state.attr(el, "id"))
}

pub fn grid_prices(page: &SnapshotDocument) -> Vec<Option<String>> {
    page.with_state(|state| {
        state
            .find_by_attr("aria-label", Some("Price"))
            .into_iter()
            .filter(|input| state.attr(input, "id").is_none())
            .map(|input| state.model_value(&input))
            .collect()
    })
}
