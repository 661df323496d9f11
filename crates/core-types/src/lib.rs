use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the port boundaries between crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Identity of one execution context (the outer document, or an isolated sub-document).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote draft identifier as issued by the target site.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a rendered surface instance (one opening of the builder, one grid).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of document an execution context is attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// The top-level listing form document.
    TopDocument,
    /// An isolated sub-document (usually the one hosting the variation builder).
    SubDocument,
}

/// Route to an execution context, threaded through every call instead of process globals.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContextRoute {
    pub context: ContextId,
    pub kind: ContextKind,
    pub url: String,
}

impl ContextRoute {
    pub fn new(context: ContextId, kind: ContextKind, url: impl Into<String>) -> Self {
        Self {
            context,
            kind,
            url: url.into(),
        }
    }

    pub fn top(url: impl Into<String>) -> Self {
        Self::new(ContextId::new(), ContextKind::TopDocument, url)
    }

    pub fn sub_document(url: impl Into<String>) -> Self {
        Self::new(ContextId::new(), ContextKind::SubDocument, url)
    }

    /// Host portion of the route url, lowercased.
    pub fn host(&self) -> Option<String> {
        host_of(&self.url)
    }

    /// Path portion of the route url without query or fragment.
    pub fn path(&self) -> String {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let path = rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/");
        path.split(['?', '#']).next().unwrap_or("/").to_string()
    }
}

impl fmt::Display for ContextRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context={} kind={:?} url={}", self.context, self.kind, self.url)
    }
}

/// Extracts the lowercased host of a url-ish string.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Namespace for everything persisted about one listing attempt.
///
/// Keyed by draft id when known, otherwise by host + path of the form.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LockScope(pub String);

impl LockScope {
    pub fn for_draft(draft: &DraftId) -> Self {
        Self(format!("draft:{}", draft.0))
    }

    pub fn for_route(route: &ContextRoute) -> Self {
        let host = route.host().unwrap_or_else(|| "local".to_string());
        Self(format!("page:{}{}", host, route.path()))
    }

    pub fn resolve(draft: Option<&DraftId>, route: &ContextRoute) -> Self {
        match draft {
            Some(draft) => Self::for_draft(draft),
            None => Self::for_route(route),
        }
    }

    /// Builds a namespaced store key below this scope.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}::{}", self.0, suffix)
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
