//! OutboxStore port - the write-ahead log of undelivered events.
//!
//! Implemented by PostgreSQL (`ferry-pg`) and by `InMemoryOutboxStore`.
//!
//! # Contract
//! - `fetch_pending` is a locking read that skips rows locked by another
//!   in-flight fetch. Locks are released when the fetch returns; the fetch
//!   itself never mutates rows.
//! - Every mutation is a single-row conditional update. Nothing holds a
//!   transaction open across a delivery.
//! - Rows are never deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EntryId, NewOutboxEntry, OutboxEntry, OutboxStats, StoreError, StuckEntry};

/// Bookkeeping for a failed delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureUpdate {
    pub id: EntryId,

    /// New value; stores keep the larger of this and the current count so
    /// that `retry_count` never decreases.
    pub retry_count: u32,
    pub last_error: String,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a PENDING row. Production writers use the database adapter's
    /// same-transaction insert instead.
    async fn insert(&self, entry: NewOutboxEntry) -> Result<OutboxEntry, StoreError>;

    /// Up to `limit` rows with `status = PENDING AND retry_count < max_retries`
    /// (and `next_retry_at` due), oldest first, skipping locked rows.
    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    /// PENDING -> PUBLISHED. Returns false when the row was no longer PENDING
    /// (already published by an overlapping instance, or failed by an operator).
    async fn mark_published(&self, id: EntryId, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Record a failed attempt on a PENDING row. Returns false when the row
    /// was no longer PENDING.
    async fn record_failure(&self, update: &FailureUpdate) -> Result<bool, StoreError>;

    /// Operator action: PENDING -> FAILED. Idempotent on FAILED, rejected on
    /// PUBLISHED.
    async fn mark_failed(&self, id: EntryId) -> Result<OutboxEntry, StoreError>;

    /// Operator action: `retry_count = 0` and `next_retry_at` cleared on a
    /// PENDING row so it becomes eligible again.
    async fn reset_retries(&self, id: EntryId) -> Result<OutboxEntry, StoreError>;

    async fn get(&self, id: EntryId) -> Result<Option<OutboxEntry>, StoreError>;

    async fn stats(&self) -> Result<OutboxStats, StoreError>;

    /// Stuck rows, oldest first.
    async fn list_stuck(&self, limit: usize) -> Result<Vec<StuckEntry>, StoreError>;
}
