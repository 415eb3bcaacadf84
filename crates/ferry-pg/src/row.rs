//! Raw rows and their conversion into domain types.

use chrono::{DateTime, Utc};
use ferry_core::domain::{EntryId, LockRecord, OutboxEntry, OutboxStatus, StoreError};
use tracing::error;

pub(crate) const ENTRY_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, destination, \
     payload, status, retry_count, max_retries, last_error, created_at, published_at, next_retry_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    id: String,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    destination: String,
    payload: Vec<u8>,
    status: String,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for OutboxEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let id: EntryId = row
            .id
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("row {}: {e}", row.id)))?;
        let status: OutboxStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("row {}: {e}", row.id)))?;

        Ok(OutboxEntry {
            id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            destination: row.destination,
            payload: row.payload,
            status,
            retry_count: from_db(row.retry_count),
            max_retries: from_db(row.max_retries),
            last_error: row.last_error,
            created_at: row.created_at,
            published_at: row.published_at,
            next_retry_at: row.next_retry_at,
        })
    }
}

/// Decode a fetched batch, leaving out rows that no longer parse. The bad row
/// stays in the table; the rest of the batch is still delivered.
pub(crate) fn decode_rows(rows: Vec<EntryRow>) -> Vec<OutboxEntry> {
    rows.into_iter()
        .filter_map(|row| match OutboxEntry::try_from(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!(error = %e, "skipping undecodable outbox row");
                None
            }
        })
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LockRow {
    name: String,
    lock_until: DateTime<Utc>,
    locked_at: DateTime<Utc>,
    locked_by: String,
}

impl From<LockRow> for LockRecord {
    fn from(row: LockRow) -> Self {
        LockRecord {
            name: row.name,
            lock_until: row.lock_until,
            locked_at: row.locked_at,
            locked_by: row.locked_by,
        }
    }
}

/// Counters are INTEGER columns guarded by `>= 0` checks.
pub(crate) fn to_db(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub(crate) fn from_db(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}
