//! Publisher integration tests against the in-memory adapters.

mod support;

mod lock_handover;
mod properties;
mod scenarios;

#[cfg(feature = "http")]
mod http;
