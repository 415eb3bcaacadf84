//! IdGenerator port - id generation.
//!
//! Writers assign entry ids themselves; this port exists so that the binary
//! and tests can do it against an injected clock.

use crate::domain::ids::{EntryId, InstanceId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_entry_id(&self) -> EntryId;

    fn generate_instance_id(&self) -> InstanceId;
}

/// ULID-based generator whose timestamp part comes from `C`.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_entry_id(&self) -> EntryId {
        EntryId::from(self.next())
    }

    fn generate_instance_id(&self) -> InstanceId {
        InstanceId::from(self.next())
    }
}
