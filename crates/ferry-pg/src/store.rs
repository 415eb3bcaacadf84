//! PgOutboxStore - the outbox table.
//!
//! The fetch runs in its own short transaction: `FOR UPDATE SKIP LOCKED`
//! keeps two overlapping fetches from returning the same rows, and the row
//! locks go away at commit, before any delivery starts. Every status change
//! afterwards is a single conditional `UPDATE ... WHERE status = 'PENDING'`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::domain::{
    EntryId, NewOutboxEntry, OutboxEntry, OutboxStats, OutboxStatus, StoreError, StuckEntry,
};
use ferry_core::ports::{FailureUpdate, OutboxStore};
use sqlx::{PgExecutor, PgPool};
use tracing::debug;

use crate::row::{ENTRY_COLUMNS, EntryRow, decode_rows, to_db};
use crate::store_error;

/// Insert a PENDING row through any executor, normally the caller's open
/// business transaction. `created_at` falls back to the database clock and an
/// unset `max_retries` to [`NewOutboxEntry::DEFAULT_MAX_RETRIES`].
pub async fn insert_entry<'e, E>(executor: E, entry: NewOutboxEntry) -> Result<OutboxEntry, StoreError>
where
    E: PgExecutor<'e>,
{
    let id = entry.id;
    let sql = format!(
        "INSERT INTO outbox_entries \
             (id, aggregate_type, aggregate_id, event_type, destination, payload, max_retries, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, now())) \
         RETURNING {ENTRY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, EntryRow>(&sql)
        .bind(id.to_storage())
        .bind(entry.aggregate_type)
        .bind(entry.aggregate_id)
        .bind(entry.event_type)
        .bind(entry.destination)
        .bind(entry.payload)
        .bind(to_db(entry.max_retries.unwrap_or(NewOutboxEntry::DEFAULT_MAX_RETRIES)))
        .bind(entry.created_at)
        .fetch_one(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(id),
            other => store_error(other),
        })?;
    row.try_into()
}

#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
    default_max_retries: u32,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            default_max_retries: NewOutboxEntry::DEFAULT_MAX_RETRIES,
        }
    }

    /// Retry budget for entries inserted through this store without one.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Distinguish "no such row" from "row exists but was not PENDING" after
    /// a conditional update touched nothing.
    async fn explain_miss(&self, id: EntryId, to: OutboxStatus) -> StoreError {
        match self.get(id).await {
            Ok(Some(entry)) => StoreError::InvalidTransition {
                id,
                from: entry.status,
                to,
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => e,
        }
    }

    async fn exists(&self, id: EntryId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM outbox_entries WHERE id = $1)")
            .bind(id.to_storage())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }

    /// Apply a conditional update; report NotFound when the row is missing.
    async fn conditional(&self, id: EntryId, affected: u64) -> Result<bool, StoreError> {
        if affected == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            debug!(entry_id = %id, "row no longer PENDING, update skipped");
            Ok(false)
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn insert(&self, entry: NewOutboxEntry) -> Result<OutboxEntry, StoreError> {
        insert_entry(&self.pool, entry.or_max_retries(self.default_max_retries)).await
    }

    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM outbox_entries \
             WHERE status = 'PENDING' \
               AND retry_count < max_retries \
               AND (next_retry_at IS NULL OR next_retry_at <= $1) \
             ORDER BY created_at, id \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED"
        );

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;

        Ok(decode_rows(rows))
    }

    async fn mark_published(&self, id: EntryId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_entries \
             SET status = 'PUBLISHED', published_at = $2, last_error = NULL, next_retry_at = NULL \
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id.to_storage())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.conditional(id, result.rows_affected()).await
    }

    async fn record_failure(&self, update: &FailureUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_entries \
             SET retry_count = GREATEST(retry_count, $2), last_error = $3, next_retry_at = $4 \
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(update.id.to_storage())
        .bind(to_db(update.retry_count))
        .bind(&update.last_error)
        .bind(update.next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.conditional(update.id, result.rows_affected()).await
    }

    async fn mark_failed(&self, id: EntryId) -> Result<OutboxEntry, StoreError> {
        let sql = format!(
            "UPDATE outbox_entries SET status = 'FAILED' \
             WHERE id = $1 AND status IN ('PENDING', 'FAILED') \
             RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.to_storage())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(id, OutboxStatus::Failed).await),
        }
    }

    async fn reset_retries(&self, id: EntryId) -> Result<OutboxEntry, StoreError> {
        let sql = format!(
            "UPDATE outbox_entries SET retry_count = 0, next_retry_at = NULL \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.to_storage())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(id, OutboxStatus::Pending).await),
        }
    }

    async fn get(&self, id: EntryId) -> Result<Option<OutboxEntry>, StoreError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM outbox_entries WHERE id = $1");
        sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.to_storage())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(OutboxEntry::try_from)
            .transpose()
    }

    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        let (unpublished, stuck) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT \
                 COUNT(*) FILTER (WHERE retry_count < max_retries), \
                 COUNT(*) FILTER (WHERE retry_count >= max_retries) \
             FROM outbox_entries WHERE status = 'PENDING'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(OutboxStats {
            unpublished: u64::try_from(unpublished).unwrap_or(0),
            stuck: u64::try_from(stuck).unwrap_or(0),
        })
    }

    async fn list_stuck(&self, limit: usize) -> Result<Vec<StuckEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM outbox_entries \
             WHERE status = 'PENDING' AND retry_count >= max_retries \
             ORDER BY created_at, id \
             LIMIT $1"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(decode_rows(rows).iter().map(StuckEntry::from).collect())
    }
}
