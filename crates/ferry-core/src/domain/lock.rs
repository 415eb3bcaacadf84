//! LockRecord: one row per named publisher lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-bounded mutex row.
///
/// The lock is held while `lock_until` lies in the future. A crashed holder
/// therefore releases automatically once its hold expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub name: String,
    pub lock_until: DateTime<Utc>,

    // diagnostics only
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}

impl LockRecord {
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }

    pub fn is_owned_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.locked_by == owner && self.is_held_at(now)
    }
}
