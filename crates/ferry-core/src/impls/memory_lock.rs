//! InMemoryLockStore - lock table for tests and single-process runs.
//!
//! Each operation runs under one mutex, which gives the same "one row, one
//! conditional write" atomicity the SQL upsert has.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LockRecord, StoreError};
use crate::ports::LockStore;

#[derive(Default)]
struct LockTable {
    rows: HashMap<String, LockRecord>,
    down: bool,
}

/// Clones share the same table, so two coordinators built from clones
/// contend exactly like two replicas against one database.
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    table: Arc<Mutex<LockTable>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.lock().down = !available;
    }

    fn lock(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn open(&self) -> Result<MutexGuard<'_, LockTable>, StoreError> {
        let table = self.lock();
        if table.down {
            return Err(StoreError::Unavailable("in-memory lock store is offline".into()));
        }
        Ok(table)
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut table = self.open()?;
        if let Some(rec) = table.rows.get(name)
            && rec.is_held_at(now)
        {
            return Ok(false);
        }
        table.rows.insert(
            name.to_string(),
            LockRecord {
                name: name.to_string(),
                lock_until: until,
                locked_at: now,
                locked_by: owner.to_string(),
            },
        );
        Ok(true)
    }

    async fn renew(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut table = self.open()?;
        match table.rows.get_mut(name) {
            Some(rec) if rec.is_owned_by(owner, now) => {
                rec.lock_until = until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(
        &self,
        name: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut table = self.open()?;
        match table.rows.get_mut(name) {
            Some(rec) if rec.is_owned_by(owner, now) => {
                rec.lock_until = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.open()?.rows.get(name).cloned())
    }
}
