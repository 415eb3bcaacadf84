//! Domain model (ids, entries, locks, decisions, errors, read models).

pub mod decision;
pub mod entry;
pub mod errors;
pub mod ids;
pub mod lock;
pub mod stats;

pub use decision::{Decider, Transition};
pub use entry::{NewOutboxEntry, OutboxEntry, OutboxStatus, UnknownStatus};
pub use errors::{DeliveryError, DeliveryErrorKind, StoreError};
pub use ids::{EntryId, Id, IdMarker, InstanceId, ParseIdError};
pub use lock::LockRecord;
pub use stats::{CycleReport, OutboxStats, PublishSummary, StuckEntry};
