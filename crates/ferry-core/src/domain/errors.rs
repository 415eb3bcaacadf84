//! Errors - classified failures at the two external boundaries.
//!
//! - `DeliveryError`: a single send to the external queue failed.
//! - `StoreError`: the database (outbox rows or lock rows) failed.
//!
//! Delivery failures are per-entry and never abort a cycle. Storage failures
//! abort the whole cycle; the next tick starts from scratch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::entry::OutboxStatus;
use super::ids::EntryId;

/// DeliveryErrorKind decides what the Retry Policy does with a failure.
///
/// - Transient: network timeout, throttling, destination temporarily down
/// - Permanent: destination does not exist, payload rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryErrorKind {
    Transient,
    Permanent,
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryErrorKind::Transient => f.write_str("transient"),
            DeliveryErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} delivery failure: {message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// A send that did not complete within its deadline. Always transient.
    pub fn timeout(after: Duration) -> Self {
        Self::transient(format!("send timed out after {}ms", after.as_millis()))
    }

    pub fn is_transient(&self) -> bool {
        self.kind == DeliveryErrorKind::Transient
    }
}

/// StoreError covers every failure of the Outbox Store and Lock Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("outbox entry not found: {0}")]
    NotFound(EntryId),

    #[error("cannot move {id} from {from} to {to}")]
    InvalidTransition {
        id: EntryId,
        from: OutboxStatus,
        to: OutboxStatus,
    },

    #[error("outbox entry already exists: {0}")]
    Duplicate(EntryId),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}
