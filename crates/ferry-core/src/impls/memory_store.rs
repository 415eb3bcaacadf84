//! InMemoryOutboxStore - outbox table for tests and the dev binary.
//!
//! Emulates what the database gives the coordinator:
//! - `fetch_pending` takes row locks for the duration of its "transaction"
//!   (a configurable simulated round trip) and skips rows locked by another
//!   in-flight fetch, so concurrent fetches return disjoint sets
//! - every mutation is a conditional update on one row
//! - outages can be switched on to exercise cycle aborts
//!
//! ```ignore
//! let store = InMemoryOutboxStore::new().with_fetch_latency(Duration::from_millis(20));
//! store.insert(NewOutboxEntry::new(EntryId::generate(), "orders", b"{}".to_vec())).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    EntryId, NewOutboxEntry, OutboxEntry, OutboxStats, OutboxStatus, StoreError, StuckEntry,
};
use crate::ports::{Clock, FailureUpdate, OutboxStore, SystemClock};

#[derive(Default)]
struct StoreState {
    rows: HashMap<EntryId, OutboxEntry>,

    /// Rows locked by a fetch that has not returned yet.
    row_locks: HashSet<EntryId>,

    /// Every status change, in order.
    history: Vec<StatusChange>,

    reads_down: bool,
    writes_down: bool,
}

impl StoreState {
    fn check_reads(&self) -> Result<(), StoreError> {
        if self.reads_down {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.writes_down {
            return Err(StoreError::Unavailable("in-memory store rejects writes".into()));
        }
        Ok(())
    }

    fn sorted(&self) -> Vec<&OutboxEntry> {
        let mut rows: Vec<&OutboxEntry> = self.rows.values().collect();
        rows.sort_by_key(|e| (e.created_at, e.id));
        rows
    }

    fn set_status(&mut self, id: EntryId, to: OutboxStatus) {
        if let Some(row) = self.rows.get_mut(&id) {
            let from = row.status;
            row.status = to;
            if from != to {
                self.history.push(StatusChange { id, from, to });
            }
        }
    }
}

/// One recorded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub id: EntryId,
    pub from: OutboxStatus,
    pub to: OutboxStatus,
}

/// Outbox table held in process memory.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct InMemoryOutboxStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    fetch_latency: Duration,
    default_max_retries: u32,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock: Arc::new(SystemClock),
            fetch_latency: Duration::ZERO,
            default_max_retries: NewOutboxEntry::DEFAULT_MAX_RETRIES,
        }
    }

    /// Clock used to stamp `created_at` on insert.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long a fetch keeps its rows locked before returning.
    pub fn with_fetch_latency(mut self, latency: Duration) -> Self {
        self.fetch_latency = latency;
        self
    }

    /// Retry budget for entries inserted without one.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Simulate the database going away (reads and writes).
    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        state.reads_down = !available;
        state.writes_down = !available;
    }

    /// Simulate status updates failing while fetches still work.
    pub fn set_writes_available(&self, available: bool) {
        self.lock().writes_down = !available;
    }

    /// Snapshot of every row, oldest first.
    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.lock().sorted().into_iter().cloned().collect()
    }

    /// Snapshot of one row without going through the async port.
    pub fn entry(&self, id: EntryId) -> Option<OutboxEntry> {
        self.lock().rows.get(&id).cloned()
    }

    pub fn history(&self) -> Vec<StatusChange> {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases row locks when the simulated fetch transaction ends, including
/// when the fetch future is dropped mid-flight.
struct RowLockGuard {
    state: Arc<Mutex<StoreState>>,
    ids: Vec<EntryId>,
}

impl Drop for RowLockGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        for id in &self.ids {
            state.row_locks.remove(id);
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, entry: NewOutboxEntry) -> Result<OutboxEntry, StoreError> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.check_writes()?;

        if state.rows.contains_key(&entry.id) {
            return Err(StoreError::Duplicate(entry.id));
        }
        let row = entry.or_max_retries(self.default_max_retries).into_entry(now);
        state.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let batch: Vec<OutboxEntry> = {
            let mut state = self.lock();
            state.check_reads()?;

            let batch: Vec<OutboxEntry> = state
                .sorted()
                .into_iter()
                .filter(|e| e.is_eligible_at(now) && !state.row_locks.contains(&e.id))
                .take(limit)
                .cloned()
                .collect();

            for e in &batch {
                state.row_locks.insert(e.id);
            }
            batch
        };

        let _locks = RowLockGuard {
            state: Arc::clone(&self.state),
            ids: batch.iter().map(|e| e.id).collect(),
        };
        if !self.fetch_latency.is_zero() {
            tokio::time::sleep(self.fetch_latency).await;
        }

        Ok(batch)
    }

    async fn mark_published(&self, id: EntryId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.check_writes()?;

        let row = state.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if row.status != OutboxStatus::Pending {
            return Ok(false);
        }
        row.published_at = Some(at);
        row.last_error = None;
        row.next_retry_at = None;
        state.set_status(id, OutboxStatus::Published);
        Ok(true)
    }

    async fn record_failure(&self, update: &FailureUpdate) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.check_writes()?;

        let row = state
            .rows
            .get_mut(&update.id)
            .ok_or(StoreError::NotFound(update.id))?;
        if row.status != OutboxStatus::Pending {
            return Ok(false);
        }
        row.retry_count = row.retry_count.max(update.retry_count);
        row.last_error = Some(update.last_error.clone());
        row.next_retry_at = update.next_retry_at;
        Ok(true)
    }

    async fn mark_failed(&self, id: EntryId) -> Result<OutboxEntry, StoreError> {
        let mut state = self.lock();
        state.check_writes()?;

        let status = state.rows.get(&id).ok_or(StoreError::NotFound(id))?.status;
        match status {
            OutboxStatus::Published => Err(StoreError::InvalidTransition {
                id,
                from: status,
                to: OutboxStatus::Failed,
            }),
            OutboxStatus::Failed | OutboxStatus::Pending => {
                state.set_status(id, OutboxStatus::Failed);
                state.rows.get(&id).cloned().ok_or(StoreError::NotFound(id))
            }
        }
    }

    async fn reset_retries(&self, id: EntryId) -> Result<OutboxEntry, StoreError> {
        let mut state = self.lock();
        state.check_writes()?;

        let row = state.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if row.status != OutboxStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id,
                from: row.status,
                to: OutboxStatus::Pending,
            });
        }
        row.retry_count = 0;
        row.next_retry_at = None;
        Ok(row.clone())
    }

    async fn get(&self, id: EntryId) -> Result<Option<OutboxEntry>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.rows.get(&id).cloned())
    }

    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        let state = self.lock();
        state.check_reads()?;

        let mut stats = OutboxStats::default();
        for row in state.rows.values() {
            if row.status != OutboxStatus::Pending {
                continue;
            }
            if row.retry_count < row.max_retries {
                stats.unpublished += 1;
            } else {
                stats.stuck += 1;
            }
        }
        Ok(stats)
    }

    async fn list_stuck(&self, limit: usize) -> Result<Vec<StuckEntry>, StoreError> {
        let state = self.lock();
        state.check_reads()?;

        Ok(state
            .sorted()
            .into_iter()
            .filter(|e| e.is_stuck())
            .take(limit)
            .map(StuckEntry::from)
            .collect())
    }
}
