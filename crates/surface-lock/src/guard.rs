use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use listing_core_types::{now_epoch_ms, ContextId, LockScope};
use listing_state_center::KvStore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{LockError, Result};
use crate::model::{LockConfig, LockLease, LockOwner, LockRecord};

/// Advisory lock over one surface, held per scope.
///
/// One instance per execution context. The in-process tier rejects a second
/// run inside the same context; the shared tier lives in the store and keeps
/// two contexts off the same surface. The store has no compare-and-swap, so
/// acquisition writes, waits briefly and reads back to see whose write stuck.
pub struct SurfaceLock {
    store: Arc<dyn KvStore>,
    local: DashMap<String, LocalHold>,
    config: LockConfig,
}

struct LocalHold {
    holder: ContextId,
    since: Instant,
}

impl LocalHold {
    fn now(holder: &ContextId) -> Self {
        Self {
            holder: holder.clone(),
            since: Instant::now(),
        }
    }
}

impl SurfaceLock {
    pub fn new(store: Arc<dyn KvStore>, config: LockConfig) -> Self {
        Self {
            store,
            local: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn key(&self, scope: &LockScope) -> String {
        scope.key(&self.config.key)
    }

    pub async fn try_acquire(&self, scope: &LockScope, owner: &LockOwner) -> Result<LockLease> {
        self.enter_local(scope, owner)?;
        match self.acquire_shared(scope, owner).await {
            Ok(lease) => Ok(lease),
            Err(err) => {
                self.local.remove(&scope.0);
                Err(err)
            }
        }
    }

    fn enter_local(&self, scope: &LockScope, owner: &LockOwner) -> Result<()> {
        let ttl = Duration::from_millis(self.config.local_ttl_ms);
        match self.local.entry(scope.0.clone()) {
            Entry::Occupied(mut held) => {
                let age = held.get().since.elapsed();
                if age < ttl {
                    return Err(LockError::Contended {
                        scope: scope.clone(),
                        holder: held.get().holder.to_string(),
                        tier: "local",
                        age_ms: age.as_millis().min(i64::MAX as u128) as i64,
                    });
                }
                debug!(scope = %scope, holder = %held.get().holder, "expired in-process lease replaced");
                held.insert(LocalHold::now(&owner.context_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(LocalHold::now(&owner.context_id));
            }
        }
        Ok(())
    }

    async fn acquire_shared(&self, scope: &LockScope, owner: &LockOwner) -> Result<LockLease> {
        let key = self.key(scope);
        if let Some(existing) = self.read(scope).await? {
            let now = now_epoch_ms();
            if existing.owner.context_id == owner.context_id {
                debug!(scope = %scope, "re-acquiring lock already held by this context");
            } else if existing.is_stale(now, self.config.shared_ttl_ms) {
                info!(
                    scope = %scope,
                    holder = %existing.owner.context_id,
                    age_ms = existing.age_ms(now),
                    "stale surface lock force-released"
                );
            } else if existing.owner.structurally_invalid_for(owner) {
                warn!(
                    scope = %scope,
                    holder = %existing.owner.context_id,
                    holder_reach = ?existing.owner.reach,
                    "surface lock held by a context that cannot reach the surface; force-released"
                );
            } else {
                return Err(LockError::Contended {
                    scope: scope.clone(),
                    holder: existing.owner.context_id.to_string(),
                    tier: "shared",
                    age_ms: existing.age_ms(now),
                });
            }
        }

        let record = LockRecord {
            scope: scope.clone(),
            acquired_at_epoch_ms: now_epoch_ms(),
            owner: owner.clone(),
        };
        self.store.set(&key, serde_json::to_value(&record)?).await?;
        if self.config.confirm_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.confirm_delay_ms)).await;
        }

        match self.read(scope).await? {
            Some(stored) if stored.held_by(owner) => {
                info!(scope = %scope, context = %owner.context_id, "surface lock acquired");
                Ok(LockLease {
                    scope: scope.clone(),
                    owner: owner.clone(),
                    acquired_at_epoch_ms: stored.acquired_at_epoch_ms,
                })
            }
            Some(stored) => Err(LockError::Contended {
                scope: scope.clone(),
                holder: stored.owner.context_id.to_string(),
                tier: "shared",
                age_ms: stored.age_ms(now_epoch_ms()),
            }),
            None => Err(LockError::Contended {
                scope: scope.clone(),
                holder: "unknown".to_string(),
                tier: "shared",
                age_ms: 0,
            }),
        }
    }

    /// Current shared record. An unreadable record counts as no lock.
    pub async fn read(&self, scope: &LockScope) -> Result<Option<LockRecord>> {
        let Some(stored) = self.store.get(&self.key(scope)).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<LockRecord>(stored.value) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(scope = %scope, "unreadable surface lock discarded: {}", err);
                Ok(None)
            }
        }
    }

    /// Pushes the shared record's timestamp forward while still held.
    /// `false` means the record is gone or names another owner.
    pub async fn renew(&self, lease: &mut LockLease) -> Result<bool> {
        match self.read(&lease.scope).await? {
            Some(stored) if stored.held_by(&lease.owner) => {
                let record = LockRecord {
                    acquired_at_epoch_ms: now_epoch_ms(),
                    ..stored
                };
                self.store
                    .set(&self.key(&lease.scope), serde_json::to_value(&record)?)
                    .await?;
                lease.acquired_at_epoch_ms = record.acquired_at_epoch_ms;
                self.local
                    .insert(lease.scope.0.clone(), LocalHold::now(&lease.owner.context_id));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drops both tiers. The shared record is only removed while it still
    /// names this lease's owner.
    pub async fn release(&self, lease: &LockLease) -> Result<()> {
        self.local.remove(&lease.scope.0);
        match self.read(&lease.scope).await? {
            Some(stored) if stored.held_by(&lease.owner) => {
                self.store.remove(&self.key(&lease.scope)).await?;
                info!(scope = %lease.scope, "surface lock released");
            }
            Some(stored) => {
                debug!(scope = %lease.scope, holder = %stored.owner.context_id, "lock taken over; leaving it");
            }
            None => {}
        }
        Ok(())
    }

    /// Removes whatever shared record exists for `scope`.
    pub async fn force_release(&self, scope: &LockScope) -> Result<bool> {
        self.local.remove(&scope.0);
        let existed = self.store.get(&self.key(scope)).await?.is_some();
        if existed {
            self.store.remove(&self.key(scope)).await?;
            warn!(scope = %scope, "surface lock force-released");
        }
        Ok(existed)
    }
}
