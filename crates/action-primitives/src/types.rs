//! Core data types for action primitives

use listing_core_types::ContextRoute;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Execution context for action primitives
///
/// Threaded through every call in place of process-wide flags:
/// - Route identifying the execution context (outer document or sub-document)
/// - Deadline for timeout enforcement
/// - Cancellation token for cooperative cancellation
/// - Unique action ID for tracing and correlation
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Target execution route
    pub route: ContextRoute,

    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(route: ContextRoute, deadline: Instant, cancel_token: CancellationToken) -> Self {
        Self {
            route,
            deadline,
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Context that expires `budget` from now.
    pub fn with_budget(route: ContextRoute, budget: Duration) -> Self {
        Self::new(route, Instant::now() + budget, CancellationToken::new())
    }

    /// Child context sharing route and cancellation, with a fresh action id.
    pub fn child(&self) -> Self {
        Self {
            route: self.route.clone(),
            deadline: self.deadline,
            cancel_token: self.cancel_token.child_token(),
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Identifier of one document reachable from an execution context.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one element inside a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    pub document: DocumentId,
    pub node: usize,
}

impl ElementRef {
    pub fn new(document: DocumentId, node: usize) -> Self {
        Self { document, node }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.node)
    }
}

/// How a document relates to the viewing execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    SameOrigin,
    CrossOrigin,
    /// Shadow-encapsulated tree attached to a host element.
    Shadow,
}

impl DocumentOrigin {
    pub fn is_readable(self) -> bool {
        !matches!(self, DocumentOrigin::CrossOrigin)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub url: String,
    pub origin: DocumentOrigin,
    /// Element in the parent document hosting this one (frame or shadow host).
    pub host_element: Option<ElementRef>,
}

impl DocumentInfo {
    pub fn is_top(&self) -> bool {
        self.host_element.is_none()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between centers.
    pub fn distance_to(&self, other: &Rect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Read-only view of one element as reported by a [`crate::DomPort`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub element: ElementRef,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Visible text of the element and its descendants, whitespace-collapsed.
    pub text: String,
    /// Raw control property value (not necessarily what the page's state model holds).
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub visible: bool,
    pub enabled: bool,
    pub rect: Rect,
    pub dom_index: usize,
    pub depth: usize,
    pub parent: Option<ElementRef>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn input_type(&self) -> Option<&str> {
        if self.is_tag("input") {
            Some(self.attr("type").unwrap_or("text"))
        } else {
            None
        }
    }

    /// Accepts typed text (text inputs, textareas, contenteditable).
    pub fn is_text_entry(&self) -> bool {
        match self.input_type() {
            Some(kind) => matches!(
                kind,
                "text" | "search" | "number" | "tel" | "email" | "url" | ""
            ),
            None => {
                self.is_tag("textarea")
                    || self.attr("contenteditable") == Some("true")
                    || self.role() == Some("textbox")
                    || self.role() == Some("combobox")
            }
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// Interaction events the committer dispatches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "key")]
pub enum DomEvent {
    PointerDown,
    PointerUp,
    MouseDown,
    MouseUp,
    Click,
    Focus,
    Blur,
    FocusOut,
    Input,
    Change,
    KeyDown(String),
    KeyUp(String),
}

impl DomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomEvent::PointerDown => "pointerdown",
            DomEvent::PointerUp => "pointerup",
            DomEvent::MouseDown => "mousedown",
            DomEvent::MouseUp => "mouseup",
            DomEvent::Click => "click",
            DomEvent::Focus => "focus",
            DomEvent::Blur => "blur",
            DomEvent::FocusOut => "focusout",
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::KeyDown(_) => "keydown",
            DomEvent::KeyUp(_) => "keyup",
        }
    }

    pub fn is_deactivation(&self) -> bool {
        matches!(self, DomEvent::Blur | DomEvent::FocusOut)
    }
}

/// Which setter writes a control's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetterKind {
    /// Lowest-level prototype setter, bypassing per-instance interceptors.
    Native,
    /// Plain property assignment, visible to interceptors.
    Property,
}

/// Binary or remote content handed to a file input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    pub mime: String,
    pub source: FileSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    Url(String),
    Bytes(Vec<u8>),
}

impl FilePayload {
    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = url
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split(['?', '#']).next())
            .filter(|tail| !tail.is_empty())
            .unwrap_or("image")
            .to_string();
        Self {
            name,
            mime: "image/*".to_string(),
            source: FileSource::Url(url),
        }
    }

    pub fn bytes(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            source: FileSource::Bytes(data),
        }
    }
}
