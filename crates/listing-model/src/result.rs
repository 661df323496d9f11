use serde::{Deserialize, Serialize};

/// How a field value reached the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMethod {
    /// Direct manipulation of the rendered form.
    Dom,
    /// Structured write through the remote draft API.
    RemoteWrite,
}

impl CommitMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CommitMethod::Dom => "dom",
            CommitMethod::RemoteWrite => "remote_write",
        }
    }
}

/// Outcome of one logical field for one run. Never revised after it is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCommitResult {
    pub field: String,
    pub committed: bool,
    pub method: CommitMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FieldCommitResult {
    pub fn committed(field: impl Into<String>, method: CommitMethod) -> Self {
        Self {
            field: field.into(),
            committed: true,
            method,
            detail: None,
        }
    }

    pub fn failed(field: impl Into<String>, method: CommitMethod, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            committed: false,
            method,
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Third-party taxonomy entry for one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAttributeSpec {
    pub name: String,
    /// Exact semantic equivalents.
    #[serde(default)]
    pub strict_aliases: Vec<String>,
    /// Broader synonyms, consulted after strict aliases.
    #[serde(default)]
    pub soft_aliases: Vec<String>,
}

impl TargetAttributeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strict_aliases: Vec::new(),
            soft_aliases: Vec::new(),
        }
    }
}
