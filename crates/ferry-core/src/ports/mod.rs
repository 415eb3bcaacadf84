//! Ports - the seams to storage, the external queue and time.
//!
//! Hexagonal layout: each trait hides one external system so the Publisher
//! Loop can run against PostgreSQL in production and in-memory adapters in
//! tests.

pub mod clock;
pub mod delivery_sink;
pub mod id_generator;
pub mod lock_store;
pub mod outbox_store;

pub use self::clock::{Clock, ManualClock, SystemClock, deadline_after};
pub use self::delivery_sink::{Ack, DeliverySink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lock_store::LockStore;
pub use self::outbox_store::{FailureUpdate, OutboxStore};
