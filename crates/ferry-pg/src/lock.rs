//! PgLockStore - the `outbox_locks` table.
//!
//! Acquisition is a single upsert whose `DO UPDATE` only fires when the
//! current hold has expired, so "affected one row" means "we own it now".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::domain::{LockRecord, StoreError};
use ferry_core::ports::LockStore;
use sqlx::PgPool;

use crate::row::LockRow;
use crate::store_error;

#[derive(Debug, Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO outbox_locks (name, lock_until, locked_at, locked_by) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name) DO UPDATE \
                 SET lock_until = EXCLUDED.lock_until, \
                     locked_at = EXCLUDED.locked_at, \
                     locked_by = EXCLUDED.locked_by \
                 WHERE outbox_locks.lock_until <= EXCLUDED.locked_at",
        )
        .bind(name)
        .bind(until)
        .bind(now)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn renew(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_locks SET lock_until = $4 \
             WHERE name = $1 AND locked_by = $2 AND lock_until > $3",
        )
        .bind(name)
        .bind(owner)
        .bind(now)
        .bind(until)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_locks SET lock_until = $3 \
             WHERE name = $1 AND locked_by = $2 AND lock_until > $3",
        )
        .bind(name)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        let row = sqlx::query_as::<_, LockRow>(
            "SELECT name, lock_until, locked_at, locked_by FROM outbox_locks WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(LockRecord::from))
    }
}
