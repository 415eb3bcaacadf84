//! ferry-pg
//!
//! PostgreSQL adapters for ferry-core.
//!
//! - [`PgOutboxStore`]: outbox rows, fetched with `FOR UPDATE SKIP LOCKED`
//! - [`PgLockStore`]: named locks via one conditional upsert
//! - [`insert_entry`]: the writer side, run inside the caller's transaction
//! - [`migrate`]: idempotent schema creation
//!
//! ```ignore
//! let pool = PgPool::connect(&url).await?;
//! ferry_pg::migrate(&pool).await?;
//!
//! let mut tx = pool.begin().await?;
//! sqlx::query("UPDATE orders SET state = 'paid' WHERE id = $1").bind(order_id).execute(&mut *tx).await?;
//! ferry_pg::insert_entry(&mut *tx, NewOutboxEntry::new(EntryId::generate(), "orders", payload)).await?;
//! tx.commit().await?;
//! ```

mod lock;
mod row;
mod schema;
mod store;

pub use lock::PgLockStore;
pub use schema::{LOCK_TABLE, OUTBOX_TABLE, migrate};
pub use store::{PgOutboxStore, insert_entry};

use ferry_core::domain::StoreError;

/// Connection-level failures are `Unavailable`; anything else the database
/// said is a `Backend` error.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::backend(other),
    }
}
