//! Table definitions.

use sqlx::PgPool;
use tracing::info;

pub const OUTBOX_TABLE: &str = "outbox_entries";
pub const LOCK_TABLE: &str = "outbox_locks";

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS outbox_entries (
        id              TEXT PRIMARY KEY,
        aggregate_type  TEXT NOT NULL DEFAULT '',
        aggregate_id    TEXT NOT NULL DEFAULT '',
        event_type      TEXT NOT NULL DEFAULT '',
        destination     TEXT NOT NULL,
        payload         BYTEA NOT NULL,
        status          TEXT NOT NULL DEFAULT 'PENDING'
                        CHECK (status IN ('PENDING', 'PUBLISHED', 'FAILED')),
        retry_count     INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
        max_retries     INTEGER NOT NULL DEFAULT 5 CHECK (max_retries >= 0),
        last_error      TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        published_at    TIMESTAMPTZ,
        next_retry_at   TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS outbox_entries_pending_idx
        ON outbox_entries (created_at, id)
        WHERE status = 'PENDING'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS outbox_locks (
        name        TEXT PRIMARY KEY,
        lock_until  TIMESTAMPTZ NOT NULL,
        locked_at   TIMESTAMPTZ NOT NULL,
        locked_by   TEXT NOT NULL
    )
    "#,
];

/// Create the outbox and lock tables if they are missing. Safe to run on
/// every start.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!(outbox = OUTBOX_TABLE, locks = LOCK_TABLE, "schema ready");
    Ok(())
}
