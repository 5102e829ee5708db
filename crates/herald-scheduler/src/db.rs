use rusqlite::Connection;

use crate::error::Result;

/// Initialise the job catalog schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and an index on `(enabled, updated_at)`
/// so the sync query streams enabled jobs newest-first without a sort step.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            cron_expr   TEXT    NOT NULL DEFAULT '',
            payload     TEXT,               -- JSON or NULL
            options     TEXT    NOT NULL DEFAULT '[]',  -- JSON array of {type, value}
            enabled     INTEGER NOT NULL DEFAULT 1,
            updated_at  TEXT    NOT NULL    -- RFC 3339, nanosecond precision, UTC
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_enabled_updated
            ON jobs (enabled, updated_at DESC);
        ",
    )?;
    Ok(())
}
