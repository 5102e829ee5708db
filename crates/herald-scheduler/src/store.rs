//! Job catalog persistence.
//!
//! The scheduler only consumes [`JobStore::find_enabled`]; the CRUD helpers on
//! [`SqliteJobStore`] back the command line.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument};

use herald_core::{Job, JobOption};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};

/// Rows buffered between the blocking reader and the async consumer.
const STREAM_BUFFER: usize = 64;

const SELECT_COLUMNS: &str = "SELECT id, name, cron_expr, payload, options, enabled, updated_at FROM jobs";

/// Read side of the job catalog consumed by the scheduler.
pub trait JobStore: Send + Sync {
    /// Stream every enabled job, most recently updated first.
    ///
    /// Dropping the stream cancels the underlying read.
    fn find_enabled(&self) -> BoxStream<'static, Result<Job>>;
}

/// SQLite-backed job catalog.
///
/// Wraps a single connection in a `Mutex`; the streaming read holds the lock
/// on a blocking thread for the duration of the query.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a job.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn save(&self, job: &Job) -> Result<()> {
        let payload = job
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let options = serde_json::to_string(&job.options)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, name, cron_expr, payload, options, enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                cron_expr = excluded.cron_expr,
                payload = excluded.payload,
                options = excluded.options,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            rusqlite::params![
                job.id,
                job.name,
                job.cron_expr,
                payload,
                options,
                job.enabled,
                format_ts(&job.updated_at)
            ],
        )?;
        info!(name = %job.name, "job saved");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id],
                read_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// Return every job, enabled or not, newest first.
    pub fn list(&self) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY updated_at DESC"))?;
        let rows = stmt.query_map([], read_row)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(decode_row(row?)?);
        }
        Ok(jobs)
    }

    /// Flip the enabled flag and bump `updated_at` so the next sync notices.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE jobs SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![enabled, format_ts(&Utc::now()), id],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, enabled, "job toggled");
        Ok(())
    }

    /// Delete a job. Returns `JobNotFound` if no row is deleted.
    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job removed");
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::Runtime("job store connection poisoned".to_string()))
    }
}

impl JobStore for SqliteJobStore {
    fn find_enabled(&self) -> BoxStream<'static, Result<Job>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let Ok(guard) = conn.lock() else {
                let _ = tx.blocking_send(Err(SchedulerError::Runtime(
                    "job store connection poisoned".to_string(),
                )));
                return;
            };
            if let Err(e) = stream_enabled(&guard, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

/// Push enabled rows into `tx` until exhausted or the receiver goes away.
fn stream_enabled(conn: &Connection, tx: &mpsc::Sender<Result<Job>>) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE enabled = 1 ORDER BY updated_at DESC"
    ))?;
    let rows = stmt.query_map([], read_row)?;
    for row in rows {
        let item = row.map_err(SchedulerError::from).and_then(decode_row);
        if tx.blocking_send(item).is_err() {
            debug!("job stream dropped by consumer");
            break;
        }
    }
    Ok(())
}

type RawRow = (String, String, String, Option<String>, String, bool, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?, // id
        row.get(1)?, // name
        row.get(2)?, // cron_expr
        row.get(3)?, // payload JSON
        row.get(4)?, // options JSON
        row.get(5)?, // enabled
        row.get(6)?, // updated_at
    ))
}

fn decode_row(raw: RawRow) -> Result<Job> {
    let (id, name, cron_expr, payload, options, enabled, updated_at) = raw;
    let invalid = |reason: String| SchedulerError::InvalidRecord {
        id: id.clone(),
        reason,
    };

    let payload = payload
        .map(|p| serde_json::from_str::<serde_json::Value>(&p))
        .transpose()
        .map_err(|e| invalid(format!("payload: {e}")))?;
    let options: Vec<JobOption> =
        serde_json::from_str(&options).map_err(|e| invalid(format!("options: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(format!("updated_at: {e}")))?;

    Ok(Job {
        id,
        name,
        cron_expr,
        payload,
        options,
        enabled,
        updated_at,
    })
}

/// Fixed-width UTC timestamps keep lexical and chronological order identical.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures_util::TryStreamExt;

    fn store() -> SqliteJobStore {
        SqliteJobStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn save_then_get_round_trips_every_field() {
        let store = store();
        let job = Job::new("feed:fetch", "*/10 * * * *")
            .with_payload(serde_json::json!({"job_id": null, "url": "https://example.org/feed"}))
            .with_option(JobOption::new("queue", serde_json::json!("feeds")));
        store.save(&job).unwrap();

        let loaded = store.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn save_upserts_existing_row() {
        let store = store();
        let mut job = Job::new("feed:fetch", "* * * * *");
        store.save(&job).unwrap();

        job.cron_expr = "0 * * * *".to_string();
        store.save(&job).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&job.id).unwrap().unwrap().cron_expr, "0 * * * *");
    }

    #[test]
    fn remove_missing_job_is_not_found() {
        let store = store();
        assert!(matches!(
            store.remove("nope"),
            Err(SchedulerError::JobNotFound { .. })
        ));
        assert!(matches!(
            store.set_enabled("nope", false),
            Err(SchedulerError::JobNotFound { .. })
        ));
    }

    #[test]
    fn set_enabled_bumps_updated_at() {
        let store = store();
        let mut job = Job::new("feed:fetch", "* * * * *");
        job.updated_at = Utc::now() - Duration::hours(1);
        store.save(&job).unwrap();

        store.set_enabled(&job.id, false).unwrap();
        let loaded = store.get(&job.id).unwrap().unwrap();
        assert!(!loaded.enabled);
        assert!(loaded.updated_at > job.updated_at);
    }

    #[tokio::test]
    async fn find_enabled_streams_newest_first_and_skips_disabled() {
        let store = store();
        let now = Utc::now();

        let mut old = Job::new("old", "* * * * *");
        old.updated_at = now - Duration::minutes(10);
        let mut new = Job::new("new", "* * * * *");
        new.updated_at = now;
        let mut off = Job::new("off", "* * * * *");
        off.enabled = false;
        for job in [&old, &new, &off] {
            store.save(job).unwrap();
        }

        let jobs: Vec<Job> = store.find_enabled().try_collect().await.unwrap();
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn corrupt_row_surfaces_as_stream_error() {
        let store = store();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO jobs (id, name, cron_expr, options, enabled, updated_at)
                 VALUES ('bad', 'x', '* * * * *', 'not json', 1, '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }

        let result: Result<Vec<Job>> = store.find_enabled().try_collect().await;
        assert!(matches!(result, Err(SchedulerError::InvalidRecord { .. })));
    }
}
