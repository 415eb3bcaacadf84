//! Retry policy: what a delivery result does to an entry's bookkeeping.
//!
//! ## Outcomes
//!
//! | attempt result | retry_count          | status    | next fetch            |
//! |----------------|----------------------|-----------|-----------------------|
//! | success        | unchanged            | PUBLISHED | never                 |
//! | transient      | `+ 1`                | PENDING   | while `< max_retries` |
//! | permanent      | `= max_retries`      | PENDING   | never (stuck)         |
//!
//! A stuck entry is not FAILED. It stays PENDING so an operator can either
//! reset its retries or mark it FAILED explicitly.
//!
//! ## Spacing
//!
//! Without a [`Backoff`] the poll interval is the only delay between two
//! attempts. With one, each transient failure records `next_retry_at` and the
//! fetch skips the entry until then.
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use ferry_core::app::RetryPolicy;
//! use ferry_core::domain::{Decider, DeliveryError, EntryId, NewOutboxEntry, Transition};
//!
//! let now = Utc::now();
//! let entry = NewOutboxEntry::new(EntryId::generate(), "orders", b"{}".to_vec())
//!     .max_retries(3)
//!     .into_entry(now);
//! let policy = RetryPolicy::fixed();
//!
//! let err = DeliveryError::transient("broker unavailable");
//! assert!(matches!(
//!     policy.decide(&entry, Err(&err), now),
//!     Transition::Retry { retry_count: 1, next_retry_at: None, .. }
//! ));
//!
//! let err = DeliveryError::permanent("no such queue");
//! assert!(matches!(
//!     policy.decide(&entry, Err(&err), now),
//!     Transition::Exhausted { retry_count: 3, .. }
//! ));
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{Decider, DeliveryError, DeliveryErrorKind, OutboxEntry, Transition};
use crate::ports::deadline_after;

/// Exponential spacing between attempts, recorded as `next_retry_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,

    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Backoff {
    pub fn with_base(base: Duration) -> Self {
        Self {
            base,
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }

    /// Delay before the next attempt, given the retry count after this failure.
    ///
    /// delay = base * multiplier^(retry_count - 1), capped at `max_delay`.
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use ferry_core::app::Backoff;
    /// let backoff = Backoff::with_base(Duration::from_secs(2));
    /// assert_eq!(backoff.next_delay(1), Duration::from_secs(2));
    /// assert_eq!(backoff.next_delay(3), Duration::from_secs(8));
    /// assert_eq!(backoff.next_delay(30), backoff.max_delay);
    /// ```
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// RetryPolicy is the default `Decider`.
///
/// - success: PUBLISHED, `published_at = now`
/// - transient: `retry_count + 1`; stuck once it reaches `max_retries`
/// - permanent: `retry_count = max_retries` at once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPolicy {
    backoff: Option<Backoff>,
}

impl RetryPolicy {
    /// Fixed-interval retries: the poll interval is the only spacing.
    pub fn fixed() -> Self {
        Self { backoff: None }
    }

    pub fn with_backoff(backoff: Backoff) -> Self {
        Self {
            backoff: Some(backoff),
        }
    }

    pub fn backoff(&self) -> Option<&Backoff> {
        self.backoff.as_ref()
    }
}

impl Decider for RetryPolicy {
    fn decide(
        &self,
        entry: &OutboxEntry,
        result: Result<(), &DeliveryError>,
        now: DateTime<Utc>,
    ) -> Transition {
        let err = match result {
            Ok(()) => return Transition::Published { at: now },
            Err(err) => err,
        };

        match err.kind {
            DeliveryErrorKind::Permanent => Transition::Exhausted {
                retry_count: entry.max_retries.max(entry.retry_count),
                error: err.to_string(),
                kind: err.kind,
            },
            DeliveryErrorKind::Transient => {
                let retry_count = entry.retry_count.saturating_add(1);
                if retry_count >= entry.max_retries {
                    Transition::Exhausted {
                        retry_count,
                        error: err.to_string(),
                        kind: err.kind,
                    }
                } else {
                    Transition::Retry {
                        retry_count,
                        error: err.to_string(),
                        next_retry_at: self
                            .backoff
                            .as_ref()
                            .map(|b| deadline_after(now, b.next_delay(retry_count))),
                    }
                }
            }
        }
    }
}
