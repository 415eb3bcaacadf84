//! PublisherBuilder - wiring the ports into a Publisher Loop.
//!
//! Fail-fast: a missing port or an unusable config is reported by `build()`,
//! not discovered on the first tick.

use std::sync::Arc;

use super::config::{ConfigError, PublisherConfig};
use super::lock::LockCoordinator;
use super::publisher_loop::PublisherLoop;
use super::retry::RetryPolicy;
use super::status::Operations;
use crate::domain::{Decider, InstanceId};
use crate::ports::{Clock, DeliverySink, LockStore, OutboxStore, SystemClock};

/// # Usage
/// ```ignore
/// let publisher = Arc::new(
///     PublisherBuilder::new()
///         .store(Arc::new(PgOutboxStore::new(pool.clone())))
///         .lock_store(Arc::new(PgLockStore::new(pool)))
///         .sink(Arc::new(sink))
///         .config(PublisherConfig::from_env()?)
///         .build_loop()?,
/// );
/// let handle = PublisherHandle::spawn(publisher);
/// ```
#[derive(Default)]
pub struct PublisherBuilder {
    store: Option<Arc<dyn OutboxStore>>,
    lock_store: Option<Arc<dyn LockStore>>,
    sink: Option<Arc<dyn DeliverySink>>,
    clock: Option<Arc<dyn Clock>>,
    decider: Option<Arc<dyn Decider>>,
    instance: Option<InstanceId>,
    config: PublisherConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. Set it on the builder before build().")]
    MissingComponent(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl PublisherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn OutboxStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn lock_store(mut self, lock_store: Arc<dyn LockStore>) -> Self {
        self.lock_store = Some(lock_store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to `RetryPolicy` built from the config's backoff setting.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Defaults to a fresh ULID.
    pub fn instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and assemble the loop without starting it.
    pub fn build_loop(self) -> Result<PublisherLoop, BuildError> {
        self.config.validate()?;

        let store = self.store.ok_or(BuildError::MissingComponent("outbox store"))?;
        let lock_store = self
            .lock_store
            .ok_or(BuildError::MissingComponent("lock store"))?;
        let sink = self.sink.ok_or(BuildError::MissingComponent("delivery sink"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let decider = self.decider.unwrap_or_else(|| {
            Arc::new(match &self.config.backoff {
                Some(backoff) => RetryPolicy::with_backoff(backoff.clone()),
                None => RetryPolicy::fixed(),
            })
        });
        let instance = self.instance.unwrap_or_else(InstanceId::generate);

        let lock = LockCoordinator::new(lock_store, Arc::clone(&clock), instance);
        Ok(PublisherLoop::new(
            store,
            sink,
            lock,
            decider,
            clock,
            self.config,
        ))
    }

    /// Build the loop and the operator surface around it, without a scheduler.
    pub fn build_operations(self) -> Result<Operations, BuildError> {
        Ok(Operations::new(Arc::new(self.build_loop()?)))
    }
}
