//! A [`DomPort`] over a captured page.
//!
//! The snapshot keeps a small model of the client-side UI framework the target
//! pages run: controls marked `managed` hold their value in a state model that
//! only updates when an activated control sees a real input (native setter +
//! input event) and is then deactivated. Plain property assignment is caught by
//! the framework's value tracker and never reaches the model. Click hooks let
//! callers script page reactions (panels opening, chips appearing, grids
//! rendering) without a browser.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use listing_core_types::host_of;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::ActionError;
use crate::port::DomPort;
use crate::types::{
    DocumentId, DocumentInfo, DocumentOrigin, DomEvent, ElementInfo, ElementRef, FilePayload,
    Rect, SetterKind,
};

/// Serialized page: one entry per document (top, frames, shadow trees).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub documents: Vec<DocumentSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub host: Option<HostSnapshot>,
    pub root: NodeSnapshot,
}

/// Element (by `id` attribute) in another document that hosts this one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub document: String,
    pub element: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Value is owned by the page's state model.
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn managed(mut self) -> Self {
        self.managed = true;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSnapshot>) -> Self {
        self.children.extend(children);
        self
    }
}

/// What the page saw, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum JournalEvent {
    Dom(DomEvent),
    Set { value: String, setter: SetterKind },
    Checked(bool),
    Files(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct JournalEntry {
    pub element: ElementRef,
    pub event: JournalEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookTrigger {
    Click,
    Input,
    Change,
    Enter,
    /// The state model accepted a pending value.
    Commit,
}

pub type SnapshotHook = Arc<dyn Fn(&mut SnapshotState, &ElementRef) + Send + Sync>;

struct HookEntry {
    element_id: String,
    trigger: HookTrigger,
    hook: SnapshotHook,
}

#[derive(Clone, Debug)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    dom_value: Option<String>,
    tracker: Option<String>,
    model: Option<String>,
    pending: Option<String>,
    checked: Option<bool>,
    hidden: bool,
    rect: Rect,
    managed: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    removed: bool,
    files: Vec<String>,
}

impl Node {
    fn is_focusable(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "input" | "textarea" | "select" | "button" | "a"
        ) || self.attrs.contains_key("tabindex")
            || self.attrs.get("contenteditable").map(String::as_str) == Some("true")
    }

    fn is_toggle(&self) -> bool {
        self.checked.is_some()
            || (self.tag == "input"
                && matches!(
                    self.attrs.get("type").map(String::as_str),
                    Some("checkbox") | Some("radio")
                ))
            || self.attrs.get("role").map(String::as_str) == Some("switch")
    }

    fn accepts_value(&self) -> bool {
        match self.tag.as_str() {
            "input" => !matches!(
                self.attrs.get("type").map(String::as_str),
                Some("checkbox") | Some("radio") | Some("file") | Some("button") | Some("submit")
            ),
            "textarea" | "select" => true,
            _ => {
                self.attrs.get("contenteditable").map(String::as_str) == Some("true")
                    || matches!(
                        self.attrs.get("role").map(String::as_str),
                        Some("textbox") | Some("combobox")
                    )
            }
        }
    }

    fn self_disabled(&self) -> bool {
        self.attrs.contains_key("disabled")
            || self.attrs.get("aria-disabled").map(String::as_str) == Some("true")
    }
}

struct DocState {
    id: DocumentId,
    url: String,
    origin_key: String,
    shadow: bool,
    host: Option<ElementRef>,
    nodes: Vec<Node>,
}

/// Mutable page state; hooks receive it to script page reactions.
pub struct SnapshotState {
    docs: Vec<DocState>,
    journal: Vec<JournalEntry>,
    focused: Option<ElementRef>,
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl SnapshotState {
    fn from_page(page: PageSnapshot) -> Result<Self, ActionError> {
        if page.documents.is_empty() {
            return Err(ActionError::Snapshot("page has no documents".into()));
        }
        let mut docs = Vec::with_capacity(page.documents.len());
        for doc in &page.documents {
            let mut nodes = Vec::new();
            push_tree(&mut nodes, &doc.root, None);
            docs.push(DocState {
                id: DocumentId(doc.id.clone()),
                url: doc.url.clone(),
                origin_key: host_of(&doc.url).unwrap_or_else(|| doc.url.clone()),
                shadow: doc.shadow,
                host: None,
                nodes,
            });
        }
        let mut state = Self {
            docs,
            journal: Vec::new(),
            focused: None,
        };
        for (idx, doc) in page.documents.iter().enumerate() {
            let Some(host) = &doc.host else { continue };
            let host_doc = DocumentId(host.document.clone());
            let host_ref = state.find_in(&host_doc, &host.element).ok_or_else(|| {
                ActionError::Snapshot(format!(
                    "host element '{}' missing in document '{}'",
                    host.element, host.document
                ))
            })?;
            state.docs[idx].host = Some(host_ref);
        }
        // Shadow trees share the origin of the document hosting them.
        for idx in 0..state.docs.len() {
            if !state.docs[idx].shadow {
                continue;
            }
            let mut origin = None;
            let mut cursor = state.docs[idx].host.clone();
            let mut hops = 0;
            while let Some(host) = cursor {
                let Some(parent) = state.doc_index(&host.document) else { break };
                if !state.docs[parent].shadow || hops > state.docs.len() {
                    origin = Some(state.docs[parent].origin_key.clone());
                    break;
                }
                cursor = state.docs[parent].host.clone();
                hops += 1;
            }
            if let Some(origin) = origin {
                state.docs[idx].origin_key = origin;
            }
        }
        Ok(state)
    }

    fn doc_index(&self, doc: &DocumentId) -> Option<usize> {
        self.docs.iter().position(|d| &d.id == doc)
    }

    fn node(&self, el: &ElementRef) -> Result<&Node, ActionError> {
        self.doc_index(&el.document)
            .and_then(|idx| self.docs[idx].nodes.get(el.node))
            .filter(|node| !node.removed)
            .ok_or_else(|| ActionError::StaleElement(el.to_string()))
    }

    fn node_mut(&mut self, el: &ElementRef) -> Result<&mut Node, ActionError> {
        let idx = self
            .doc_index(&el.document)
            .ok_or_else(|| ActionError::StaleElement(el.to_string()))?;
        self.docs[idx]
            .nodes
            .get_mut(el.node)
            .filter(|node| !node.removed)
            .ok_or_else(|| ActionError::StaleElement(el.to_string()))
    }

    fn record(&mut self, el: &ElementRef, event: JournalEvent) {
        self.journal.push(JournalEntry {
            element: el.clone(),
            event,
        });
    }

    /// Finds an element by `id` attribute in any document.
    pub fn find(&self, id: &str) -> Option<ElementRef> {
        self.docs
            .iter()
            .find_map(|doc| self.find_in(&doc.id, id))
    }

    pub fn find_in(&self, doc: &DocumentId, id: &str) -> Option<ElementRef> {
        let idx = self.doc_index(doc)?;
        self.docs[idx]
            .nodes
            .iter()
            .position(|node| !node.removed && node.attrs.get("id").map(String::as_str) == Some(id))
            .map(|node| ElementRef::new(doc.clone(), node))
    }

    /// Every live element carrying `key` (and `value`, when given).
    pub fn find_by_attr(&self, key: &str, value: Option<&str>) -> Vec<ElementRef> {
        let mut out = Vec::new();
        for doc in &self.docs {
            for (idx, node) in doc.nodes.iter().enumerate() {
                if node.removed {
                    continue;
                }
                let hit = match (node.attrs.get(key), value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    _ => false,
                };
                if hit {
                    out.push(ElementRef::new(doc.id.clone(), idx));
                }
            }
        }
        out
    }

    pub fn attr(&self, el: &ElementRef, key: &str) -> Option<String> {
        self.node(el).ok().and_then(|node| node.attrs.get(key).cloned())
    }

    pub fn set_attr(&mut self, el: &ElementRef, key: &str, value: &str) {
        if let Ok(node) = self.node_mut(el) {
            node.attrs.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, el: &ElementRef, key: &str) {
        if let Ok(node) = self.node_mut(el) {
            node.attrs.remove(key);
        }
    }

    pub fn set_disabled(&mut self, el: &ElementRef, disabled: bool) {
        if disabled {
            self.set_attr(el, "disabled", "");
        } else {
            self.remove_attr(el, "disabled");
        }
    }

    pub fn set_hidden(&mut self, el: &ElementRef, hidden: bool) {
        if let Ok(node) = self.node_mut(el) {
            node.hidden = hidden;
        }
    }

    pub fn set_text(&mut self, el: &ElementRef, text: &str) {
        if let Ok(node) = self.node_mut(el) {
            node.text = text.to_string();
        }
    }

    /// Own text of the element (descendants excluded).
    pub fn own_text(&self, el: &ElementRef) -> Option<String> {
        self.node(el).ok().map(|node| node.text.clone())
    }

    pub fn set_url(&mut self, doc: &DocumentId, url: &str) {
        if let Some(idx) = self.doc_index(doc) {
            self.docs[idx].url = url.to_string();
        }
    }

    /// Appends `child` under `parent`; returns the new element.
    pub fn append_child(&mut self, parent: &ElementRef, child: NodeSnapshot) -> Option<ElementRef> {
        let doc_idx = self.doc_index(&parent.document)?;
        if self.docs[doc_idx].nodes.get(parent.node).map(|n| n.removed) != Some(false) {
            return None;
        }
        let nodes = &mut self.docs[doc_idx].nodes;
        let new_idx = push_tree(nodes, &child, Some(parent.node));
        Some(ElementRef::new(parent.document.clone(), new_idx))
    }

    /// Removes the element and its subtree.
    pub fn remove(&mut self, el: &ElementRef) {
        let Some(doc_idx) = self.doc_index(&el.document) else { return };
        let mut stack = vec![el.node];
        while let Some(idx) = stack.pop() {
            if let Some(node) = self.docs[doc_idx].nodes.get_mut(idx) {
                node.removed = true;
                stack.extend(node.children.iter().copied());
            }
        }
        if self.focused.as_ref() == Some(el) {
            self.focused = None;
        }
    }

    /// Live children in document order.
    pub fn children(&self, el: &ElementRef) -> Vec<ElementRef> {
        let Some(doc_idx) = self.doc_index(&el.document) else { return Vec::new() };
        self.docs[doc_idx]
            .nodes
            .get(el.node)
            .map(|node| {
                node.children
                    .iter()
                    .copied()
                    .filter(|child| !self.docs[doc_idx].nodes[*child].removed)
                    .map(|child| ElementRef::new(el.document.clone(), child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent(&self, el: &ElementRef) -> Option<ElementRef> {
        self.node(el)
            .ok()
            .and_then(|node| node.parent)
            .map(|parent| ElementRef::new(el.document.clone(), parent))
    }

    /// Value held by the page's state model.
    pub fn model_value(&self, el: &ElementRef) -> Option<String> {
        let node = self.node(el).ok()?;
        if node.managed {
            node.model.clone()
        } else {
            node.dom_value.clone()
        }
    }

    /// Raw control property.
    pub fn dom_value(&self, el: &ElementRef) -> Option<String> {
        self.node(el).ok().and_then(|node| node.dom_value.clone())
    }

    /// Writes both the control and its model, as a page render would.
    pub fn set_rendered_value(&mut self, el: &ElementRef, value: &str) {
        if let Ok(node) = self.node_mut(el) {
            node.dom_value = Some(value.to_string());
            node.tracker = Some(value.to_string());
            node.model = Some(value.to_string());
            node.pending = None;
        }
    }

    pub fn is_checked(&self, el: &ElementRef) -> Option<bool> {
        self.node(el).ok().and_then(|node| node.checked)
    }

    pub fn files(&self, el: &ElementRef) -> Vec<String> {
        self.node(el).map(|node| node.files.clone()).unwrap_or_default()
    }

    pub fn focused(&self) -> Option<ElementRef> {
        self.focused.clone()
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    fn commit_pending(&mut self, el: &ElementRef, fired: &mut Vec<(HookTrigger, ElementRef)>) {
        if let Ok(node) = self.node_mut(el) {
            if let Some(pending) = node.pending.take() {
                node.model = Some(pending);
                fired.push((HookTrigger::Commit, el.clone()));
            }
        }
    }

    fn blur(&mut self, el: &ElementRef, fired: &mut Vec<(HookTrigger, ElementRef)>) {
        self.commit_pending(el, fired);
        if self.focused.as_ref() == Some(el) {
            self.focused = None;
        }
    }

    fn apply(
        &mut self,
        el: &ElementRef,
        event: &DomEvent,
        enabled: bool,
    ) -> Result<Vec<(HookTrigger, ElementRef)>, ActionError> {
        let mut fired = Vec::new();
        self.node(el)?;
        self.record(el, JournalEvent::Dom(event.clone()));
        match event {
            DomEvent::PointerDown | DomEvent::PointerUp | DomEvent::MouseDown | DomEvent::MouseUp => {}
            DomEvent::Click => {
                if !enabled {
                    return Err(ActionError::NotEnabled(el.to_string()));
                }
                if let Some(previous) = self.focused.clone() {
                    if &previous != el {
                        self.blur(&previous, &mut fired);
                    }
                }
                let node = self.node_mut(el)?;
                let focusable = node.is_focusable();
                if node.is_toggle() {
                    let next = !node.checked.unwrap_or(false);
                    node.checked = Some(next);
                    fired.push((HookTrigger::Change, el.clone()));
                }
                if focusable {
                    self.focused = Some(el.clone());
                }
                fired.insert(0, (HookTrigger::Click, el.clone()));
            }
            DomEvent::Focus => {
                if let Some(previous) = self.focused.clone() {
                    if &previous != el {
                        self.blur(&previous, &mut fired);
                    }
                }
                self.focused = Some(el.clone());
            }
            DomEvent::Blur | DomEvent::FocusOut => self.blur(el, &mut fired),
            DomEvent::Input => {
                let focused = self.focused.as_ref() == Some(el);
                let node = self.node_mut(el)?;
                if node.managed {
                    if focused && node.dom_value != node.tracker {
                        node.pending = node.dom_value.clone();
                        node.tracker = node.dom_value.clone();
                    }
                } else {
                    node.model = node.dom_value.clone();
                }
                fired.push((HookTrigger::Input, el.clone()));
            }
            DomEvent::Change => fired.push((HookTrigger::Change, el.clone())),
            DomEvent::KeyDown(key) if key == "Enter" => {
                self.commit_pending(el, &mut fired);
                fired.push((HookTrigger::Enter, el.clone()));
            }
            DomEvent::KeyDown(_) | DomEvent::KeyUp(_) => {}
        }
        Ok(fired)
    }

    fn doc_elements(&self, doc_idx: usize) -> Vec<ElementInfo> {
        let doc = &self.docs[doc_idx];
        let mut out = Vec::new();
        if doc.nodes.is_empty() {
            return out;
        }
        // (node, depth, hidden ancestor, disabled ancestor)
        let mut stack = vec![(0usize, 0usize, false, false)];
        while let Some((idx, depth, hidden_above, disabled_above)) = stack.pop() {
            let node = &doc.nodes[idx];
            if node.removed {
                continue;
            }
            let hidden = hidden_above || node.hidden;
            let disabled_here = node.self_disabled();
            let fieldset_block = node.tag == "fieldset" && disabled_here;
            out.push(ElementInfo {
                element: ElementRef::new(doc.id.clone(), idx),
                tag: node.tag.clone(),
                attributes: node.attrs.clone(),
                text: collapse_ws(&self.subtree_text(doc_idx, idx)),
                value: node.dom_value.clone(),
                checked: node.checked,
                visible: !hidden && node.rect.area() > 0.0,
                enabled: !(disabled_here || disabled_above),
                rect: node.rect,
                dom_index: out.len(),
                depth,
                parent: node.parent.map(|p| ElementRef::new(doc.id.clone(), p)),
            });
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1, hidden, disabled_above || fieldset_block));
            }
        }
        out
    }

    fn subtree_text(&self, doc_idx: usize, idx: usize) -> String {
        let nodes = &self.docs[doc_idx].nodes;
        let mut parts = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let node = &nodes[current];
            if node.removed || (node.hidden && current != idx) {
                continue;
            }
            if !node.text.is_empty() {
                parts.push(node.text.as_str());
            }
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        parts.join(" ")
    }
}

fn push_tree(nodes: &mut Vec<Node>, snap: &NodeSnapshot, parent: Option<usize>) -> usize {
    let idx = nodes.len();
    let rect = snap
        .rect
        .unwrap_or_else(|| Rect::new(0.0, idx as f64 * 24.0, 200.0, 24.0));
    nodes.push(Node {
        tag: snap.tag.to_ascii_lowercase(),
        attrs: snap.attrs.clone(),
        text: snap.text.clone(),
        dom_value: snap.value.clone(),
        tracker: snap.value.clone(),
        model: snap.value.clone(),
        pending: None,
        checked: snap.checked,
        hidden: snap.hidden,
        rect,
        managed: snap.managed,
        parent,
        children: Vec::new(),
        removed: false,
        files: Vec::new(),
    });
    if let Some(parent) = parent {
        nodes[parent].children.push(idx);
    }
    for child in &snap.children {
        push_tree(nodes, child, Some(idx));
    }
    idx
}

struct Shared {
    state: Mutex<SnapshotState>,
    hooks: RwLock<Vec<HookEntry>>,
}

/// Port over a [`PageSnapshot`], viewed from one of its documents.
#[derive(Clone)]
pub struct SnapshotDocument {
    shared: Arc<Shared>,
    viewer: DocumentId,
}

impl std::fmt::Debug for SnapshotDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDocument")
            .field("viewer", &self.viewer)
            .finish()
    }
}

impl SnapshotDocument {
    pub fn from_page(page: PageSnapshot) -> Result<Self, ActionError> {
        let state = SnapshotState::from_page(page)?;
        let viewer = state
            .docs
            .iter()
            .find(|doc| doc.host.is_none())
            .unwrap_or(&state.docs[0])
            .id
            .clone();
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                hooks: RwLock::new(Vec::new()),
            }),
            viewer,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ActionError> {
        let page: PageSnapshot =
            serde_json::from_str(raw).map_err(|err| ActionError::Snapshot(err.to_string()))?;
        Self::from_page(page)
    }

    /// Single-document page.
    pub fn single(url: impl Into<String>, root: NodeSnapshot) -> Self {
        let url = url.into();
        let mut nodes = Vec::new();
        push_tree(&mut nodes, &root, None);
        let viewer = DocumentId("main".into());
        let state = SnapshotState {
            docs: vec![DocState {
                id: viewer.clone(),
                origin_key: host_of(&url).unwrap_or_else(|| url.clone()),
                url,
                shadow: false,
                host: None,
                nodes,
            }],
            journal: Vec::new(),
            focused: None,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                hooks: RwLock::new(Vec::new()),
            }),
            viewer,
        }
    }

    /// Same page, viewed from the execution context of `doc`.
    pub fn view_of(&self, doc: &DocumentId) -> Result<Self, ActionError> {
        if self.shared.state.lock().doc_index(doc).is_none() {
            return Err(ActionError::DocumentNotFound(doc.to_string()));
        }
        Ok(Self {
            shared: self.shared.clone(),
            viewer: doc.clone(),
        })
    }

    pub fn viewer(&self) -> &DocumentId {
        &self.viewer
    }

    /// Registers a page reaction for the element with `id` (`"*"` matches any).
    pub fn on<F>(&self, element_id: impl Into<String>, trigger: HookTrigger, hook: F)
    where
        F: Fn(&mut SnapshotState, &ElementRef) + Send + Sync + 'static,
    {
        self.shared.hooks.write().push(HookEntry {
            element_id: element_id.into(),
            trigger,
            hook: Arc::new(hook),
        });
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut SnapshotState) -> R) -> R {
        let mut state = self.shared.state.lock();
        f(&mut state)
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.state.lock().journal.clone()
    }

    fn origin_of(&self, state: &SnapshotState, idx: usize) -> DocumentOrigin {
        let viewer_origin = state
            .doc_index(&self.viewer)
            .map(|v| state.docs[v].origin_key.as_str())
            .unwrap_or_default();
        let doc = &state.docs[idx];
        if doc.origin_key != viewer_origin {
            DocumentOrigin::CrossOrigin
        } else if doc.shadow {
            DocumentOrigin::Shadow
        } else {
            DocumentOrigin::SameOrigin
        }
    }

    fn readable_index(&self, state: &SnapshotState, doc: &DocumentId) -> Result<usize, ActionError> {
        let idx = state
            .doc_index(doc)
            .ok_or_else(|| ActionError::DocumentNotFound(doc.to_string()))?;
        if self.origin_of(state, idx).is_readable() {
            Ok(idx)
        } else {
            Err(ActionError::CrossOrigin(doc.to_string()))
        }
    }

    fn fire(&self, state: &mut SnapshotState, fired: Vec<(HookTrigger, ElementRef)>) {
        if fired.is_empty() {
            return;
        }
        let hooks = self.shared.hooks.read();
        for (trigger, el) in fired {
            let id = state.attr(&el, "id");
            for entry in hooks.iter() {
                let matches_el = entry.element_id == "*" || id.as_deref() == Some(entry.element_id.as_str());
                if entry.trigger == trigger && matches_el {
                    trace!(element = %el, ?trigger, "snapshot hook");
                    (entry.hook)(state, &el);
                }
            }
        }
    }

    fn info(&self, state: &SnapshotState, el: &ElementRef) -> Result<ElementInfo, ActionError> {
        let idx = self.readable_index(state, &el.document)?;
        state.node(el)?;
        state
            .doc_elements(idx)
            .into_iter()
            .find(|info| &info.element == el)
            .ok_or_else(|| ActionError::StaleElement(el.to_string()))
    }
}

#[async_trait]
impl DomPort for SnapshotDocument {
    async fn location(&self) -> Result<String, ActionError> {
        let state = self.shared.state.lock();
        state
            .doc_index(&self.viewer)
            .map(|idx| state.docs[idx].url.clone())
            .ok_or_else(|| ActionError::DocumentNotFound(self.viewer.to_string()))
    }

    async fn documents(&self) -> Result<Vec<DocumentInfo>, ActionError> {
        let state = self.shared.state.lock();
        let mut docs: Vec<DocumentInfo> = (0..state.docs.len())
            .map(|idx| DocumentInfo {
                id: state.docs[idx].id.clone(),
                url: state.docs[idx].url.clone(),
                origin: self.origin_of(&state, idx),
                host_element: state.docs[idx].host.clone(),
            })
            .collect();
        // Viewing document first.
        if let Some(pos) = docs.iter().position(|doc| doc.id == self.viewer) {
            let viewer = docs.remove(pos);
            docs.insert(0, viewer);
        }
        Ok(docs)
    }

    async fn elements(&self, doc: &DocumentId) -> Result<Vec<ElementInfo>, ActionError> {
        let state = self.shared.state.lock();
        let idx = self.readable_index(&state, doc)?;
        Ok(state.doc_elements(idx))
    }

    async fn element(&self, el: &ElementRef) -> Result<ElementInfo, ActionError> {
        let state = self.shared.state.lock();
        self.info(&state, el)
    }

    async fn dispatch(&self, el: &ElementRef, event: DomEvent) -> Result<(), ActionError> {
        let mut state = self.shared.state.lock();
        let enabled = self.info(&state, el)?.enabled;
        let fired = state.apply(el, &event, enabled)?;
        self.fire(&mut state, fired);
        Ok(())
    }

    async fn set_value(&self, el: &ElementRef, value: &str, setter: SetterKind) -> Result<(), ActionError> {
        let mut state = self.shared.state.lock();
        let info = self.info(&state, el)?;
        if !info.enabled {
            return Err(ActionError::NotEnabled(el.to_string()));
        }
        let option_value = if info.is_tag("select") {
            let wanted = value.trim().to_lowercase();
            let idx = self.readable_index(&state, &el.document)?;
            let option = state
                .doc_elements(idx)
                .into_iter()
                .filter(|opt| opt.is_tag("option") && opt.parent.as_ref() == Some(el))
                .find(|opt| {
                    opt.attr("value").map(|v| v.to_lowercase()) == Some(wanted.clone())
                        || opt.text.to_lowercase() == wanted
                })
                .ok_or_else(|| ActionError::Unsupported(format!("no option '{}' in {}", value, el)))?;
            Some(
                option
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| option.text.clone()),
            )
        } else {
            None
        };
        let node = state.node_mut(el)?;
        if !node.accepts_value() {
            return Err(ActionError::Unsupported(format!("{} does not hold a value", el)));
        }
        let stored = option_value.unwrap_or_else(|| value.to_string());
        node.dom_value = Some(stored.clone());
        if node.managed && setter == SetterKind::Property {
            node.tracker = Some(stored.clone());
        }
        state.record(
            el,
            JournalEvent::Set {
                value: stored,
                setter,
            },
        );
        Ok(())
    }

    async fn read_value(&self, el: &ElementRef) -> Result<String, ActionError> {
        let state = self.shared.state.lock();
        self.readable_index(&state, &el.document)?;
        let node = state.node(el)?;
        if node.is_toggle() {
            return Ok(node.checked.unwrap_or(false).to_string());
        }
        Ok(state.model_value(el).unwrap_or_default())
    }

    async fn set_checked(&self, el: &ElementRef, checked: bool) -> Result<(), ActionError> {
        let mut state = self.shared.state.lock();
        let info = self.info(&state, el)?;
        if !info.enabled {
            return Err(ActionError::NotEnabled(el.to_string()));
        }
        let node = state.node_mut(el)?;
        if !node.is_toggle() {
            return Err(ActionError::Unsupported(format!("{} is not a toggle", el)));
        }
        if node.checked.unwrap_or(false) == checked {
            return Ok(());
        }
        node.checked = Some(checked);
        state.record(el, JournalEvent::Checked(checked));
        self.fire(&mut state, vec![(HookTrigger::Change, el.clone())]);
        Ok(())
    }

    async fn attach_files(&self, el: &ElementRef, files: &[FilePayload]) -> Result<usize, ActionError> {
        let mut state = self.shared.state.lock();
        let info = self.info(&state, el)?;
        if info.input_type() != Some("file") {
            return Err(ActionError::Unsupported(format!("{} is not a file input", el)));
        }
        if !info.enabled {
            return Err(ActionError::NotEnabled(el.to_string()));
        }
        let accepted = if info.attributes.contains_key("multiple") {
            files.len()
        } else {
            files.len().min(1)
        };
        let node = state.node_mut(el)?;
        node.files
            .extend(files.iter().take(accepted).map(|file| file.name.clone()));
        state.record(el, JournalEvent::Files(accepted));
        debug!(element = %el, accepted, "files attached");
        self.fire(&mut state, vec![(HookTrigger::Change, el.clone())]);
        Ok(accepted)
    }

    async fn neutral_element(&self, doc: &DocumentId) -> Result<ElementRef, ActionError> {
        let state = self.shared.state.lock();
        let idx = self.readable_index(&state, doc)?;
        let node = state.docs[idx]
            .nodes
            .iter()
            .position(|node| !node.removed && node.tag == "body")
            .unwrap_or(0);
        Ok(ElementRef::new(doc.clone(), node))
    }
}
