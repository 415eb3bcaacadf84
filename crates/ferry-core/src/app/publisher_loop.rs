//! PublisherLoop - one drain cycle of the outbox.
//!
//! Idle -> AcquiringLock -> Fetching -> Delivering -> Idle
//!
//! - AcquiringLock -> Idle when another instance holds the lock
//! - each fetched entry gets exactly one send and one status update
//! - a storage failure aborts the cycle; row updates already committed stay
//! - a failing entry never aborts the batch

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use super::config::PublisherConfig;
use super::lock::LockCoordinator;
use crate::domain::{
    CycleReport, Decider, DeliveryError, OutboxEntry, StoreError, Transition,
};
use crate::error::OutboxError;
use crate::ports::{Clock, DeliverySink, FailureUpdate, OutboxStore};

/// Where the loop currently is. `Idle` between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublisherState {
    Idle,
    AcquiringLock,
    Fetching,
    Delivering,
}

/// Result of one entry's attempt.
enum EntryOutcome {
    Published,
    Retried,
    Stuck,
    /// Row left PENDING before our update landed (overlapping instance or
    /// operator action); nothing recorded.
    Superseded,
}

pub struct PublisherLoop {
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn DeliverySink>,
    lock: LockCoordinator,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    config: PublisherConfig,

    /// Did the previous cycle end with the lock in hand?
    holding: AtomicBool,

    /// One cycle at a time per process (scheduled tick vs. manual trigger).
    running: Mutex<()>,

    state: watch::Sender<PublisherState>,
}

/// Puts the state back to Idle however the cycle ends.
struct IdleOnDrop<'a>(&'a watch::Sender<PublisherState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(PublisherState::Idle);
    }
}

impl PublisherLoop {
    pub(crate) fn new(
        store: Arc<dyn OutboxStore>,
        sink: Arc<dyn DeliverySink>,
        lock: LockCoordinator,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        config: PublisherConfig,
    ) -> Self {
        let (state, _) = watch::channel(PublisherState::Idle);
        Self {
            store,
            sink,
            lock,
            decider,
            clock,
            config,
            holding: AtomicBool::new(false),
            running: Mutex::new(()),
            state,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    /// Run one cycle now.
    ///
    /// Returns a zeroed, `acquired == false` report when the lock is held
    /// elsewhere or a cycle is already running in this process.
    pub async fn run_cycle(&self) -> Result<CycleReport, OutboxError> {
        let Ok(_running) = self.running.try_lock() else {
            debug!("cycle already running in this process, skipping");
            return Ok(CycleReport::skipped());
        };
        let _idle = IdleOnDrop(&self.state);

        self.state.send_replace(PublisherState::AcquiringLock);
        if !self.acquire().await? {
            return Ok(CycleReport::skipped());
        }

        self.state.send_replace(PublisherState::Fetching);
        let batch = self
            .store
            .fetch_pending(self.config.batch_size, self.clock.now())
            .await
            .inspect_err(|e| error!(error = %e, "fetch failed, aborting cycle"))?;

        let mut report = CycleReport {
            acquired: true,
            fetched: batch.len(),
            ..CycleReport::default()
        };
        if batch.is_empty() {
            debug!("no pending entries");
            return Ok(report);
        }

        self.state.send_replace(PublisherState::Delivering);
        let mut outcomes = stream::iter(batch)
            .map(|entry| self.deliver(entry))
            .buffer_unordered(self.config.delivery_concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            let outcome =
                outcome.inspect_err(|e| error!(error = %e, "status update failed, aborting cycle"))?;
            match outcome {
                EntryOutcome::Published => report.published += 1,
                EntryOutcome::Retried => report.retried += 1,
                EntryOutcome::Stuck => report.stuck += 1,
                EntryOutcome::Superseded => {}
            }
        }

        info!(
            fetched = report.fetched,
            published = report.published,
            retried = report.retried,
            stuck = report.stuck,
            "cycle finished"
        );
        Ok(report)
    }

    /// Give the lock back early (graceful shutdown).
    pub async fn release(&self) -> Result<bool, StoreError> {
        self.holding.store(false, Ordering::SeqCst);
        self.lock.release(&self.config.lock_name).await
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        match self.renew_or_take().await {
            Ok(held) => {
                self.holding.store(held, Ordering::SeqCst);
                Ok(held)
            }
            Err(e) => {
                self.holding.store(false, Ordering::SeqCst);
                error!(lock = %self.config.lock_name, error = %e, "lock store unavailable, aborting cycle");
                Err(e)
            }
        }
    }

    /// Renew when we held the lock last cycle, otherwise try to take it.
    async fn renew_or_take(&self) -> Result<bool, StoreError> {
        let name = &self.config.lock_name;
        let hold = self.config.lock_hold;

        if self.holding.load(Ordering::SeqCst) && self.lock.renew(name, hold).await? {
            return Ok(true);
        }
        self.lock.try_acquire(name, hold).await
    }

    /// One send, one decision, one status update.
    async fn deliver(&self, entry: OutboxEntry) -> Result<EntryOutcome, StoreError> {
        let timeout = self.config.send_timeout;
        let sent = tokio::time::timeout(timeout, self.sink.send(&entry.destination, &entry.payload))
            .await
            .unwrap_or_else(|_| Err(DeliveryError::timeout(timeout)));

        let now = self.clock.now();
        let transition = self
            .decider
            .decide(&entry, sent.as_ref().map(|_| ()), now);

        match transition {
            Transition::Published { at } => {
                if !self.store.mark_published(entry.id, at).await? {
                    debug!(entry_id = %entry.id, "entry left PENDING before publish was recorded");
                    return Ok(EntryOutcome::Superseded);
                }
                debug!(entry_id = %entry.id, destination = %entry.destination, "entry published");
                Ok(EntryOutcome::Published)
            }
            Transition::Retry {
                retry_count,
                error,
                next_retry_at,
            } => {
                warn!(
                    entry_id = %entry.id,
                    destination = %entry.destination,
                    retry_count,
                    max_retries = entry.max_retries,
                    error = %error,
                    "transient delivery failure, will retry"
                );
                let update = FailureUpdate {
                    id: entry.id,
                    retry_count,
                    last_error: error,
                    next_retry_at,
                };
                self.record(&update, EntryOutcome::Retried).await
            }
            Transition::Exhausted {
                retry_count,
                error,
                kind,
            } => {
                error!(
                    entry_id = %entry.id,
                    destination = %entry.destination,
                    retry_count,
                    kind = %kind,
                    error = %error,
                    "delivery failed for good, entry is stuck until an operator acts"
                );
                let update = FailureUpdate {
                    id: entry.id,
                    retry_count,
                    last_error: error,
                    next_retry_at: None,
                };
                self.record(&update, EntryOutcome::Stuck).await
            }
        }
    }

    async fn record(
        &self,
        update: &FailureUpdate,
        outcome: EntryOutcome,
    ) -> Result<EntryOutcome, StoreError> {
        if self.store.record_failure(update).await? {
            Ok(outcome)
        } else {
            debug!(entry_id = %update.id, "entry left PENDING before failure was recorded");
            Ok(EntryOutcome::Superseded)
        }
    }
}
