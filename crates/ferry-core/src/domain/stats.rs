//! Read models for operators: counts, stuck rows, cycle results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entry::{OutboxEntry, OutboxStatus};
use super::ids::EntryId;

/// `GET /outbox/stats` body.
///
/// - unpublished: PENDING rows still below their retry budget
/// - stuck: PENDING rows at or above their retry budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub unpublished: u64,
    pub stuck: u64,
}

/// `POST /outbox/publish` body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub published: u64,
    pub failed: u64,
}

/// What one Publisher Loop cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// False when another instance held the lock (or a cycle was already
    /// running in this process). All counters are zero in that case.
    pub acquired: bool,
    pub fetched: usize,
    pub published: usize,

    /// Transient failures that left budget for another attempt.
    pub retried: usize,

    /// Failures that exhausted the budget in this cycle.
    pub stuck: usize,
}

impl CycleReport {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn failed(&self) -> usize {
        self.retried + self.stuck
    }
}

impl From<CycleReport> for PublishSummary {
    fn from(report: CycleReport) -> Self {
        PublishSummary {
            published: report.published as u64,
            failed: report.failed() as u64,
        }
    }
}

/// Operator view of a stuck entry. The payload is left out on purpose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StuckEntry {
    pub id: EntryId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub destination: String,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&OutboxEntry> for StuckEntry {
    fn from(e: &OutboxEntry) -> Self {
        StuckEntry {
            id: e.id,
            aggregate_type: e.aggregate_type.clone(),
            aggregate_id: e.aggregate_id.clone(),
            event_type: e.event_type.clone(),
            destination: e.destination.clone(),
            status: e.status,
            retry_count: e.retry_count,
            max_retries: e.max_retries,
            last_error: e.last_error.clone(),
            created_at: e.created_at,
        }
    }
}
