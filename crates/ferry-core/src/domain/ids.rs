//! Domain identifiers (strongly-typed IDs).
//!
//! Every identifier is a ULID wrapped in `Id<T>`, where `T` is a zero-sized
//! marker type. The marker only exists at compile time, so an `EntryId` and an
//! `InstanceId` cannot be mixed up even though both are 16 bytes on the wire.
//!
//! ULIDs sort by creation time, which matches the oldest-first drain order of
//! the outbox, and they can be generated by any writer without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for every `Id<T>` flavour.
///
/// Provides the prefix used by `Display` ("entry-", "instance-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// Serializes as the bare ULID string (no prefix), which is also what the
/// storage adapters persist.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock. Writers that need deterministic ids
    /// should go through `IdGenerator` instead.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Storage representation: the 26-character ULID without prefix.
    pub fn to_storage(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an id string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id '{input}': {reason}")]
pub struct ParseIdError {
    pub input: String,
    pub reason: String,
}

/// Accepts both the prefixed `Display` form and the bare storage form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| ParseIdError {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

// ========================================
// Markers
// ========================================

/// Marker for outbox entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entry {}

impl IdMarker for Entry {
    fn prefix() -> &'static str {
        "entry-"
    }
}

/// Marker for publisher instances (lock owners).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instance {}

impl IdMarker for Instance {
    fn prefix() -> &'static str {
        "instance-"
    }
}

// ========================================
// Aliases
// ========================================

/// Identifier of an outbox row, assigned by the writer at insert time.
///
/// # Examples
///
/// ```
/// use ferry_core::domain::EntryId;
///
/// let id = EntryId::generate();
/// let shown = id.to_string();
/// assert!(shown.starts_with("entry-"));
///
/// // both the log form and the stored form parse back to the same id
/// assert_eq!(shown.parse::<EntryId>().unwrap(), id);
/// assert_eq!(id.to_storage().parse::<EntryId>().unwrap(), id);
/// assert!("entry-nope".parse::<EntryId>().is_err());
/// ```
pub type EntryId = Id<Entry>;

/// Identity of one running publisher replica.
pub type InstanceId = Id<Instance>;
