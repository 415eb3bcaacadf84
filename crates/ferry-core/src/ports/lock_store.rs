//! LockStore port - named, time-bounded locks.
//!
//! Every operation is one conditional write; an implementation must make
//! `try_acquire` succeed for at most one caller while `lock_until > now`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LockRecord, StoreError};

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert the row, or take it over if `lock_until <= now`.
    ///
    /// Not re-entrant: a current holder asking again gets `false`.
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Extend `lock_until` if `owner` holds the lock and it has not expired.
    async fn renew(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Set `lock_until = now` if `owner` holds the lock.
    async fn release(&self, name: &str, owner: &str, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError>;
}
