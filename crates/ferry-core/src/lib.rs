//! ferry-core
//!
//! Transactional outbox publisher: drains durably recorded events to an
//! external queue with at-least-once delivery while many replicas run.
//!
//! # Modules
//! - **domain**: entries, locks, ids, errors, decisions, read models
//! - **ports**: OutboxStore, LockStore, DeliverySink, Clock, IdGenerator
//! - **impls**: in-memory adapters, webhook sink (`webhook` feature)
//! - **app**: config, retry policy, lock coordinator, publisher loop, scheduler, operations
//! - **http**: operational HTTP surface (`http` feature)

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

#[cfg(feature = "http")]
pub mod http;

pub use app::{Operations, PublisherBuilder, PublisherConfig, PublisherHandle};
pub use error::OutboxError;
