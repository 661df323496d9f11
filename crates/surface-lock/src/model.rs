use listing_core_types::{ContextId, ContextKind, LockScope, SurfaceId};
use serde::{Deserialize, Serialize};

/// Whether an owner can touch the surface's controls itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerReach {
    /// The surface is rendered inside the owner's own context.
    Direct,
    /// The owner only hands the work to another context.
    Delegating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    pub context_id: ContextId,
    pub surface_id: SurfaceId,
    pub kind: ContextKind,
    pub reach: OwnerReach,
}

impl LockOwner {
    pub fn new(context_id: ContextId, kind: ContextKind, reach: OwnerReach) -> Self {
        Self {
            context_id,
            surface_id: SurfaceId::new(),
            kind,
            reach,
        }
    }

    /// The owner can never make progress on the surface the requester drives:
    /// it is missing an identity, or it delegates while the requester reaches
    /// the controls directly.
    pub fn structurally_invalid_for(&self, requester: &LockOwner) -> bool {
        if self.context_id.0.trim().is_empty() {
            return true;
        }
        self.reach == OwnerReach::Delegating && requester.reach == OwnerReach::Direct
    }
}

/// Lock as persisted in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub scope: LockScope,
    pub acquired_at_epoch_ms: i64,
    pub owner: LockOwner,
}

impl LockRecord {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.acquired_at_epoch_ms)
    }

    pub fn is_stale(&self, now_ms: i64, ttl_ms: u64) -> bool {
        self.age_ms(now_ms) >= ttl_ms.min(i64::MAX as u64) as i64
    }

    pub fn held_by(&self, owner: &LockOwner) -> bool {
        self.owner.context_id == owner.context_id && self.owner.surface_id == owner.surface_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// In-process tier: rejects a duplicate run inside one context.
    pub local_ttl_ms: u64,
    /// Shared tier: after this a crashed owner's lock is force-released.
    pub shared_ttl_ms: u64,
    /// Wait between writing the shared record and reading it back.
    pub confirm_delay_ms: u64,
    pub key: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            local_ttl_ms: 15_000,
            shared_ttl_ms: 120_000,
            confirm_delay_ms: 25,
            key: "builder-lock".to_string(),
        }
    }
}

/// Proof of a held lock; hand it back to release or renew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub scope: LockScope,
    pub owner: LockOwner,
    pub acquired_at_epoch_ms: i64,
}
