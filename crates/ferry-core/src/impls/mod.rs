//! Impls - adapters behind the ports.
//!
//! # Included here
//! - **InMemoryOutboxStore / InMemoryLockStore**: tests and single-process runs
//! - **InMemorySink**: per-destination FIFO with scripted failures
//! - **WebhookSink** (`webhook` feature): HTTP POST per entry
//!
//! PostgreSQL adapters live in the `ferry-pg` crate.

pub mod memory_lock;
pub mod memory_sink;
pub mod memory_store;
#[cfg(feature = "webhook")]
pub mod webhook_sink;

pub use self::memory_lock::InMemoryLockStore;
pub use self::memory_sink::InMemorySink;
pub use self::memory_store::{InMemoryOutboxStore, StatusChange};
#[cfg(feature = "webhook")]
pub use self::webhook_sink::{DestinationMap, Route, WebhookSink};
