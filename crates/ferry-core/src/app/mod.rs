//! App - application layer.
//!
//! Combines the ports into the publishing workflow.
//!
//! # Main components
//! - **PublisherBuilder**: wiring and fail-fast validation
//! - **LockCoordinator**: acquire / renew / release of the named lock
//! - **RetryPolicy**: pure decision per delivery result
//! - **PublisherLoop**: one lock -> fetch -> deliver -> update cycle
//! - **PublisherHandle**: fixed-delay scheduler and graceful shutdown
//! - **Operations**: stats, manual trigger, health, operator actions

pub mod builder;
pub mod config;
pub mod lock;
pub mod publisher_loop;
pub mod retry;
pub mod scheduler;
pub mod status;

pub use self::builder::{BuildError, PublisherBuilder};
pub use self::config::{ConfigError, PublisherConfig};
pub use self::lock::LockCoordinator;
pub use self::publisher_loop::{PublisherLoop, PublisherState};
pub use self::retry::{Backoff, RetryPolicy};
pub use self::scheduler::PublisherHandle;
pub use self::status::{Health, Operations};
