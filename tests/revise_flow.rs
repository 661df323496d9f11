use std::sync::Arc;

use action_primitives::snapshot::{HookTrigger, JournalEvent, NodeSnapshot, SnapshotDocument};
use draft_remote::InMemoryDraftApi;
use listing_core_types::{ContextRoute, DraftId};
use listing_model::CommitMethod;
use listing_state_center::{InMemoryKvStore, KvStore};
use serde_json::json;

use listing_pilot::{Engine, EngineConfig, ReviseAction};

const LISTING_URL: &str = "https://shop.test/revise/1234";

/// Live listing editor: Save stays disabled until some control reports a change.
fn listing_editor() -> SnapshotDocument {
    let page = SnapshotDocument::single(
        LISTING_URL,
        NodeSnapshot::new("body").id("page").children([
            NodeSnapshot::new("input")
                .id("quantity")
                .attr("name", "quantity")
                .attr("aria-label", "Quantity")
                .value("5"),
            NodeSnapshot::new("label").text("Best offer").child(
                NodeSnapshot::new("input")
                    .id("best-offer")
                    .attr("type", "checkbox")
                    .attr("aria-label", "Best offer")
                    .checked(true),
            ),
            NodeSnapshot::new("button")
                .id("save")
                .attr("disabled", "")
                .text("Save changes"),
            NodeSnapshot::new("button").id("end").text("End listing"),
        ]),
    );
    for control in ["quantity", "best-offer"] {
        page.on(control, HookTrigger::Change, |state, _| {
            if let Some(save) = state.find("save") {
                state.set_disabled(&save, false);
            }
        });
    }
    page.on("save", HookTrigger::Click, |state, el| {
        state.set_attr(el, "data-saved", "true");
    });
    page.on("end", HookTrigger::Click, |state, el| {
        state.set_hidden(el, true);
        if let Some(body) = state.find("page") {
            state.append_child(&body, NodeSnapshot::new("button").id("confirm-end").text("Yes, end it"));
        }
    });
    page.on("confirm-end", HookTrigger::Click, |state, el| {
        state.set_attr(el, "data-ended", "true");
    });
    page
}

fn engine() -> Engine {
    let store: Arc<dyn KvStore> = InMemoryKvStore::new();
    Engine::new(EngineConfig::immediate(), store).unwrap()
}

fn attr(page: &SnapshotDocument, id: &str, key: &str) -> Option<String> {
    page.with_state(|state| state.find(id).and_then(|el| state.attr(&el, key)))
}

#[tokio::test]
async fn toggle_already_on_is_rechecked_until_save_enables() {
    let page = listing_editor();
    let action = ReviseAction::Toggle {
        label: "Best offer".into(),
        on: true,
    };

    let report = engine()
        .revise_listing(&page, ContextRoute::top(LISTING_URL), None, &action)
        .await
        .unwrap();

    assert!(report.result.committed, "{:?}", report.result);
    assert!(report.saved);
    assert_eq!(report.result.detail.as_deref(), Some("toggle re-checked and saved"));
    assert_eq!(attr(&page, "save", "data-saved").as_deref(), Some("true"));

    let toggles: Vec<JournalEvent> = page
        .journal()
        .into_iter()
        .filter(|entry| matches!(entry.event, JournalEvent::Checked(_)))
        .map(|entry| entry.event)
        .collect();
    assert_eq!(toggles, vec![JournalEvent::Checked(false), JournalEvent::Checked(true)]);
    let checked = page.with_state(|state| state.find("best-offer").and_then(|el| state.is_checked(&el)));
    assert_eq!(checked, Some(true));
}

#[tokio::test]
async fn toggle_change_saves_without_recheck() {
    let page = listing_editor();
    let action = ReviseAction::Toggle {
        label: "Best offer".into(),
        on: false,
    };

    let report = engine()
        .revise_listing(&page, ContextRoute::top(LISTING_URL), None, &action)
        .await
        .unwrap();

    assert!(report.saved);
    assert_eq!(report.result.detail.as_deref(), Some("toggle changed and saved"));
    let checked = page.with_state(|state| state.find("best-offer").and_then(|el| state.is_checked(&el)));
    assert_eq!(checked, Some(false));
}

#[tokio::test]
async fn quantity_is_committed_then_saved() {
    let page = listing_editor();
    let report = engine()
        .revise_listing(&page, ContextRoute::top(LISTING_URL), None, &ReviseAction::Quantity(7))
        .await
        .unwrap();

    assert!(report.result.committed, "{:?}", report.result);
    assert_eq!(report.result.method, CommitMethod::Dom);
    assert!(report.saved);
    let quantity = page.with_state(|state| state.find("quantity").and_then(|el| state.model_value(&el)));
    assert_eq!(quantity.as_deref(), Some("7"));
    assert_eq!(attr(&page, "save", "data-saved").as_deref(), Some("true"));

    let steps: Vec<&str> = report.log.iter().map(|entry| entry.step.as_str()).collect();
    assert_eq!(steps, vec!["revise.start", "revise.quantity"]);
}

#[tokio::test]
async fn end_listing_clicks_through_confirmation() {
    let page = listing_editor();
    let report = engine()
        .revise_listing(&page, ContextRoute::top(LISTING_URL), None, &ReviseAction::End)
        .await
        .unwrap();

    assert!(report.result.committed, "{:?}", report.result);
    assert_eq!(report.result.detail.as_deref(), Some("ended after confirmation"));
    assert_eq!(attr(&page, "confirm-end", "data-ended").as_deref(), Some("true"));
}

#[tokio::test]
async fn price_without_a_control_goes_to_the_draft_record() {
    let page = listing_editor();
    let draft_id = DraftId("d-7".into());
    let api = Arc::new(InMemoryDraftApi::new());
    api.insert(&draft_id, json!({ "title": "Linen shirt", "price": 12.0 }));
    let engine = engine().with_remote(api.clone());

    let report = engine
        .revise_listing(&page, ContextRoute::top(LISTING_URL), Some(&draft_id), &ReviseAction::Price(19.5))
        .await
        .unwrap();

    assert!(report.result.committed, "{:?}", report.result);
    assert_eq!(report.result.method, CommitMethod::RemoteWrite);
    assert!(report.saved);
    assert_eq!(api.snapshot(&draft_id).unwrap()["price"], json!(19.5));
}

#[tokio::test]
async fn invalid_price_is_rejected_up_front() {
    let page = listing_editor();
    let result = engine()
        .revise_listing(&page, ContextRoute::top(LISTING_URL), None, &ReviseAction::Price(-1.0))
        .await;
    assert!(result.is_err());
    assert!(page.journal().is_empty());
}
