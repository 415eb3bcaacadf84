//! Outbox entry: one durable "I will publish this" record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EntryId;

/// Lifecycle status of an outbox row.
///
/// State transitions:
/// - Pending -> Published (confirmed delivery, at most once)
/// - Pending -> Failed (explicit operator action only)
///
/// An entry that exhausted its retries stays `Pending` and is reported as
/// stuck; it never becomes `Failed` on its own. `Published` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outbox status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for OutboxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A row of the outbox table as seen by the coordinator.
///
/// `payload` is opaque and never inspected or rewritten after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: EntryId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,

    /// Logical queue name; resolved to a physical address by the sink.
    pub destination: String,
    pub payload: Vec<u8>,

    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,

    /// Most recent delivery failure; cleared on success.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,

    /// Only set when explicit backoff is enabled.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Would a fetch at `now` pick this entry up?
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && self.retry_count < self.max_retries
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Retry budget exhausted without a confirmed delivery.
    pub fn is_stuck(&self) -> bool {
        self.status == OutboxStatus::Pending && self.retry_count >= self.max_retries
    }
}

/// What a business writer hands to the outbox inside its own transaction.
///
/// Only `id`, `destination` and `payload` are required. The rest is metadata
/// the coordinator never interprets, plus two optional overrides:
///
/// - `max_retries`: the entry's own retry budget. When unset, the store that
///   inserts the row applies its configured default (see
///   [`NewOutboxEntry::or_max_retries`]).
/// - `created_at`: the ordering key. When unset, the store's insert time.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use ferry_core::domain::{EntryId, NewOutboxEntry, OutboxStatus};
///
/// let entry = NewOutboxEntry::new(EntryId::generate(), "orders", br#"{"a":1}"#.to_vec())
///     .aggregate("Order", "42")
///     .event_type("order.created.v1");
/// assert_eq!(entry.max_retries, None);
///
/// // a store configured with a budget of 3 fills the gap at insert time
/// let row = entry.or_max_retries(3).into_entry(Utc::now());
/// assert_eq!(row.status, OutboxStatus::Pending);
/// assert_eq!(row.retry_count, 0);
/// assert_eq!(row.max_retries, 3);
/// ```
///
/// An explicit budget wins over the store default:
///
/// ```
/// # use ferry_core::domain::{EntryId, NewOutboxEntry};
/// let entry = NewOutboxEntry::new(EntryId::generate(), "orders", b"{}".to_vec())
///     .max_retries(1)
///     .or_max_retries(10);
/// assert_eq!(entry.max_retries, Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEntry {
    pub id: EntryId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub destination: String,
    pub payload: Vec<u8>,

    /// Left empty, the inserting store applies its default budget.
    pub max_retries: Option<u32>,

    /// Left empty, the store stamps its own insert time.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOutboxEntry {
    /// Budget used when neither the writer nor the store configures one.
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    pub fn new(id: EntryId, destination: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            aggregate_type: String::new(),
            aggregate_id: String::new(),
            event_type: String::new(),
            destination: destination.into(),
            payload: payload.into(),
            max_retries: None,
            created_at: None,
        }
    }

    pub fn aggregate(mut self, aggregate_type: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_type = aggregate_type.into();
        self.aggregate_id = aggregate_id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Fill in the retry budget unless the writer already chose one.
    pub fn or_max_retries(mut self, default: u32) -> Self {
        self.max_retries.get_or_insert(default);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Materialize the row as it looks right after insert. An unset budget
    /// becomes [`Self::DEFAULT_MAX_RETRIES`].
    pub fn into_entry(self, now: DateTime<Utc>) -> OutboxEntry {
        OutboxEntry {
            id: self.id,
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            event_type: self.event_type,
            destination: self.destination,
            payload: self.payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(Self::DEFAULT_MAX_RETRIES),
            last_error: None,
            created_at: self.created_at.unwrap_or(now),
            published_at: None,
            next_retry_at: None,
        }
    }
}
