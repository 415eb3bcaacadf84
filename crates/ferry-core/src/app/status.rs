//! Operations - what operators can see and do.
//!
//! Read-only counts, a manual trigger that honors the same lock as the
//! schedule, and the two operator actions for stuck entries. Consumed by the
//! HTTP surface; nothing in the publishing path depends on it.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::publisher_loop::{PublisherLoop, PublisherState};
use crate::domain::{EntryId, NewOutboxEntry, OutboxEntry, OutboxStats, PublishSummary, StuckEntry};
use crate::error::OutboxError;

/// `GET /outbox/health` body. Liveness only; independent of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub state: PublisherState,
}

#[derive(Clone)]
pub struct Operations {
    publisher: Arc<PublisherLoop>,
}

impl Operations {
    pub const DEFAULT_STUCK_LIMIT: usize = 100;

    pub fn new(publisher: Arc<PublisherLoop>) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &Arc<PublisherLoop> {
        &self.publisher
    }

    /// Insert an entry outside a business transaction. Entries without their
    /// own budget get the publisher's configured `max_retries`.
    pub async fn enqueue(&self, entry: NewOutboxEntry) -> Result<OutboxEntry, OutboxError> {
        let entry = entry.or_max_retries(self.publisher.config().max_retries);
        let row = self.publisher.store().insert(entry).await?;
        info!(entry_id = %row.id, destination = %row.destination, max_retries = row.max_retries, "entry enqueued");
        Ok(row)
    }

    pub async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        Ok(self.publisher.store().stats().await?)
    }

    /// Run one cycle now. Zero counts when the lock is held elsewhere.
    pub async fn trigger(&self) -> Result<PublishSummary, OutboxError> {
        let report = self.publisher.run_cycle().await?;
        info!(
            acquired = report.acquired,
            published = report.published,
            failed = report.failed(),
            "manual publish finished"
        );
        Ok(report.into())
    }

    pub fn health(&self) -> Health {
        Health {
            status: "UP",
            state: self.publisher.state(),
        }
    }

    pub async fn list_stuck(&self, limit: usize) -> Result<Vec<StuckEntry>, OutboxError> {
        Ok(self.publisher.store().list_stuck(limit).await?)
    }

    /// Give up on an entry: PENDING -> FAILED. It stops taking batch slots.
    pub async fn mark_failed(&self, id: EntryId) -> Result<OutboxEntry, OutboxError> {
        let entry = self.publisher.store().mark_failed(id).await?;
        info!(entry_id = %id, retry_count = entry.retry_count, "entry marked FAILED by operator");
        Ok(entry)
    }

    /// Make a stuck entry eligible again after the root cause is fixed.
    pub async fn reset_retries(&self, id: EntryId) -> Result<OutboxEntry, OutboxError> {
        let entry = self.publisher.store().reset_retries(id).await?;
        info!(entry_id = %id, "entry retries reset by operator");
        Ok(entry)
    }
}
