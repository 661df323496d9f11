//! Port to the document surface the engine drives.
//!
//! The target page is an eventually-consistent external system; every call may
//! observe a different render. Implementations must refuse to read the content
//! of cross-origin documents.

use async_trait::async_trait;

use crate::errors::ActionError;
use crate::types::{DocumentId, DocumentInfo, DomEvent, ElementInfo, ElementRef, FilePayload, SetterKind};

#[async_trait]
pub trait DomPort: Send + Sync {
    /// Url of the viewing document.
    async fn location(&self) -> Result<String, ActionError>;

    /// Every document reachable from the viewing context, readable or not.
    /// The viewing document comes first.
    async fn documents(&self) -> Result<Vec<DocumentInfo>, ActionError>;

    /// All elements of `doc` in document order.
    async fn elements(&self, doc: &DocumentId) -> Result<Vec<ElementInfo>, ActionError>;

    async fn element(&self, el: &ElementRef) -> Result<ElementInfo, ActionError>;

    async fn dispatch(&self, el: &ElementRef, event: DomEvent) -> Result<(), ActionError>;

    async fn set_value(&self, el: &ElementRef, value: &str, setter: SetterKind) -> Result<(), ActionError>;

    /// Value as the page's own state model sees it.
    async fn read_value(&self, el: &ElementRef) -> Result<String, ActionError>;

    /// Sets a checkbox/switch, firing change only when the state differs.
    async fn set_checked(&self, el: &ElementRef, checked: bool) -> Result<(), ActionError>;

    /// Hands files to a file input; returns how many were accepted.
    async fn attach_files(&self, el: &ElementRef, files: &[FilePayload]) -> Result<usize, ActionError>;

    /// An element that is safe to click to move focus away (usually the body).
    async fn neutral_element(&self, doc: &DocumentId) -> Result<ElementRef, ActionError>;
}

/// Readable documents only, in the order the port reports them.
pub async fn readable_documents(port: &dyn DomPort) -> Result<Vec<DocumentInfo>, ActionError> {
    Ok(port
        .documents()
        .await?
        .into_iter()
        .filter(|doc| doc.origin.is_readable())
        .collect())
}
