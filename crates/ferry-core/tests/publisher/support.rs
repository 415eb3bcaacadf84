//! Shared wiring for the publisher tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ferry_core::app::{PublisherBuilder, PublisherConfig, PublisherLoop};
use ferry_core::domain::{EntryId, NewOutboxEntry};
use ferry_core::impls::{InMemoryLockStore, InMemoryOutboxStore, InMemorySink};
use ferry_core::ports::{ManualClock, OutboxStore};

/// One shared "database" plus one shared queue.
pub struct World {
    pub clock: ManualClock,
    pub store: InMemoryOutboxStore,
    pub locks: InMemoryLockStore,
    pub sink: InMemorySink,
}

impl World {
    pub fn new() -> Self {
        Self::with_sink(InMemorySink::new())
    }

    pub fn with_sink(sink: InMemorySink) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let store = InMemoryOutboxStore::new().with_clock(Arc::new(clock.clone()));
        Self {
            clock,
            store,
            locks: InMemoryLockStore::new(),
            sink,
        }
    }

    /// A publisher instance (replica) over this world.
    pub fn publisher(&self, config: PublisherConfig) -> PublisherLoop {
        self.builder(config).build_loop().unwrap()
    }

    pub fn builder(&self, config: PublisherConfig) -> PublisherBuilder {
        PublisherBuilder::new()
            .store(Arc::new(self.store.clone()))
            .lock_store(Arc::new(self.locks.clone()))
            .sink(Arc::new(self.sink.clone()))
            .clock(Arc::new(self.clock.clone()))
            .config(config)
    }

    /// Insert an entry whose payload is unique, so deliveries can be counted.
    pub async fn insert(&self, destination: &str, max_retries: u32) -> EntryId {
        let id = EntryId::generate();
        let payload = format!(r#"{{"entry":"{id}"}}"#);
        self.insert_with(id, destination, payload.as_bytes(), max_retries).await
    }

    pub async fn insert_payload(&self, destination: &str, payload: &[u8], max_retries: u32) -> EntryId {
        self.insert_with(EntryId::generate(), destination, payload, max_retries).await
    }

    async fn insert_with(&self, id: EntryId, destination: &str, payload: &[u8], max_retries: u32) -> EntryId {
        self.clock.advance(chrono::Duration::milliseconds(1));
        self.store
            .insert(NewOutboxEntry::new(id, destination, payload.to_vec()).max_retries(max_retries))
            .await
            .unwrap();
        id
    }
}

pub fn config() -> PublisherConfig {
    PublisherConfig {
        poll_interval: Duration::from_millis(100),
        batch_size: 100,
        lock_hold: Duration::from_secs(30),
        send_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}
