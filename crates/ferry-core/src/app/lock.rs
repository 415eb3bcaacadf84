//! LockCoordinator - turns N replicas into one active publisher.
//!
//! Expiry is the release mechanism: a crashed holder's lock frees itself
//! after at most one hold duration. `release` only shortens that window on a
//! graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{InstanceId, LockRecord, StoreError};
use crate::ports::{Clock, LockStore, deadline_after};

/// Lock operations bound to one instance identity and clock.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    owner: String,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>, instance: InstanceId) -> Self {
        Self {
            store,
            clock,
            owner: instance.to_string(),
        }
    }

    /// Identity written to `locked_by`.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Take `name` for `hold` if nobody holds it. Contention is not an error.
    pub async fn try_acquire(&self, name: &str, hold: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let acquired = self
            .store
            .try_acquire(name, &self.owner, now, deadline_after(now, hold))
            .await?;

        if acquired {
            info!(lock = %name, instance = %self.owner, hold_ms = hold.as_millis() as u64, "lock acquired");
        } else {
            debug!(lock = %name, instance = %self.owner, "lock held elsewhere, skipping cycle");
        }
        Ok(acquired)
    }

    /// Extend our own, still-live hold by `hold` from now.
    pub async fn renew(&self, name: &str, hold: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let renewed = self
            .store
            .renew(name, &self.owner, now, deadline_after(now, hold))
            .await?;
        debug!(lock = %name, instance = %self.owner, renewed, "lock renewal");
        Ok(renewed)
    }

    /// Best-effort early release.
    pub async fn release(&self, name: &str) -> Result<bool, StoreError> {
        let released = self.store.release(name, &self.owner, self.clock.now()).await?;
        if released {
            info!(lock = %name, instance = %self.owner, "lock released");
        }
        Ok(released)
    }

    pub async fn current(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        self.store.get(name).await
    }
}
