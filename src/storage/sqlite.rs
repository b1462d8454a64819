//! SQLite job store.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Mutex;

use super::models::Job;
use crate::error::{Error, Result};
use crate::nodes::{ExecutionOutcome, JobStatus};

/// Parse an RFC 3339 datetime string into a `chrono::DateTime<Utc>`.
///
/// Returns a `rusqlite::Error` on parse failure instead of panicking,
/// so it is safe to use inside `query_row` / `query_map` closures.
fn parse_datetime_utc(s: &str) -> rusqlite::Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_status(s: &str) -> rusqlite::Result<JobStatus> {
    s.parse::<JobStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

const JOB_COLUMNS: &str =
    "id, execution_id, node_id, node_type, status, result, created_at, updated_at";

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let result: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let status: String = row.get(4)?;

    Ok(Job {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        node_id: row.get(2)?,
        node_type: row.get(3)?,
        status: parse_status(&status)?,
        result: serde_json::from_str(&result).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: parse_datetime_utc(&created_at)?,
        updated_at: parse_datetime_utc(&updated_at)?,
    })
}

/// SQLite-based job storage.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema_sync(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema_sync(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema_sync(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Enable WAL mode for better concurrent reads during writes
            PRAGMA journal_mode = WAL;
            -- Wait up to 5 seconds when database is locked instead of failing immediately
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_execution ON jobs(execution_id, created_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a job.
    pub async fn save_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock().await;
        write_job(&conn, job)
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().await;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// List jobs of one execution, oldest first.
    pub async fn list_jobs(&self, execution_id: &str) -> Result<Vec<Job>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE execution_id = ?1 ORDER BY created_at ASC, rowid ASC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![execution_id], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Read a job, transform its outcome, and write it back.
    ///
    /// Runs under the connection lock inside an immediate transaction, so
    /// concurrent updates of the same job are serialized.
    pub async fn update_job<F>(&self, id: &str, update: F) -> Result<Job>
    where
        F: FnOnce(ExecutionOutcome) -> ExecutionOutcome,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut job = tx
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                row_to_job,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Job \"{}\" not found", id)))?;

        let outcome = update(job.outcome());
        if outcome != job.outcome() {
            job.apply(outcome);
            write_job(&tx, &job)?;
        }

        tx.commit()?;
        Ok(job)
    }
}

fn write_job(conn: &Connection, job: &Job) -> Result<()> {
    let result = serde_json::to_string(&job.result)?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO jobs
            (id, execution_id, node_id, node_type, status, result, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            job.id,
            job.execution_id,
            job.node_id,
            job.node_type,
            job.status.to_string(),
            result,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}
