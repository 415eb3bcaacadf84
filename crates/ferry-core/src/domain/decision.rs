//! Decision model: what happens to an entry after one delivery attempt.
//!
//! The Retry Policy turns an attempt result into a `Transition`; the Publisher
//! Loop then applies it to the Outbox Store. Deciding and applying are kept
//! apart so the policy stays a pure function.

use chrono::{DateTime, Utc};

use super::entry::OutboxEntry;
use super::errors::{DeliveryError, DeliveryErrorKind};

/// Next state of an entry after a delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Delivery confirmed: PENDING -> PUBLISHED, `last_error` cleared.
    Published { at: DateTime<Utc> },

    /// Transient failure with budget left: stays PENDING and is refetched.
    Retry {
        retry_count: u32,
        error: String,
        next_retry_at: Option<DateTime<Utc>>,
    },

    /// Budget exhausted (incrementally or by fast-fail): stays PENDING, stuck.
    Exhausted {
        retry_count: u32,
        error: String,
        kind: DeliveryErrorKind,
    },
}

/// Pure decision function from an attempt result to a transition.
///
/// Implementations must not touch storage; the caller applies the result.
pub trait Decider: Send + Sync {
    fn decide(
        &self,
        entry: &OutboxEntry,
        result: Result<(), &DeliveryError>,
        now: DateTime<Utc>,
    ) -> Transition;
}
