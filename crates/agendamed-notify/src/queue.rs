//! Durable email job queue over SQLite.
//!
//! Per-job state machine, explicit so the retry policy is testable with an
//! injected clock (every transition takes `now`):
//!
//! ```text
//! pending ──claim──▶ in_flight ──complete──▶ completed
//!    ▲                   │
//!    │                   ├──fail (attempts < max)──▶ retrying(next_eligible_at)
//!    └───eligible────────┘                               │
//!                        └──fail (exhausted)──────▶ failed
//! ```
//!
//! Acceptance is durable: once `enqueue` returns Ok the job survives process
//! restarts. Jobs left `in_flight` by a crash are reset to `pending` on open
//! (at-least-once delivery).

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use agendamed_core::config::QueueConfig;
use agendamed_core::error::{AppError, Result};
use agendamed_core::traits::NotificationSink;
use agendamed_core::types::NotificationPayload;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 2,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        next_eligible_at TEXT,
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, priority, created_at);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InFlight,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InFlight => "in_flight",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "retrying" => Some(Self::Retrying),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome of reporting a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Will be retried once `next_eligible_at` passes.
    Retrying { next_eligible_at: DateTime<Utc> },
    /// Retries exhausted; recorded as failed.
    Failed,
}

/// A job handed to a worker. `payload` is the raw JSON; the worker parses
/// it, so a row whose type is no longer understood can be failed permanently
/// instead of crashing the claim path.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub kind: String,
    pub payload: String,
    /// 1-based attempt number this claim represents.
    pub attempt: u32,
}

impl ClaimedJob {
    pub fn parse_payload(&self) -> Result<NotificationPayload> {
        serde_json::from_str(&self.payload).map_err(|e| {
            AppError::Queue(format!("Unparseable payload for job {}: {e}", self.id))
        })
    }
}

/// Stored job record, for operational visibility.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub priority: i64,
    pub attempts: u32,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct EmailQueue {
    conn: Mutex<Connection>,
    max_attempts: u32,
    backoff_base: Duration,
    keep_completed: usize,
    keep_failed: usize,
}

impl EmailQueue {
    /// Open or create the job store. Jobs stranded `in_flight` by a previous
    /// process are reset to `pending`.
    pub fn open(path: &Path, config: &QueueConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(queue_err)?;
        Self::init(conn, config)
    }

    /// In-memory queue for tests.
    pub fn in_memory(config: &QueueConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(queue_err)?;
        Self::init(conn, config)
    }

    fn init(conn: Connection, config: &QueueConfig) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(queue_err)?;
        let reclaimed = conn
            .execute(
                "UPDATE jobs SET status = 'pending', updated_at = ?1 WHERE status = 'in_flight'",
                params![encode_instant(Utc::now())],
            )
            .map_err(queue_err)?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Reset in-flight jobs from a previous run");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            keep_completed: config.keep_completed,
            keep_failed: config.keep_failed,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| AppError::Queue(e.to_string()))
    }

    /// Delay before attempt N+1 after N failed attempts: base × 2^(N-1).
    pub fn backoff_after(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(16);
        self.backoff_base * 2u32.pow(exponent)
    }

    /// Claim the next eligible job at `now`: lowest priority number first,
    /// then oldest. Marks it in-flight and bumps its attempt counter.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, kind, payload, attempts FROM jobs
                 WHERE status = 'pending'
                    OR (status = 'retrying' AND next_eligible_at <= ?1)
                 ORDER BY priority ASC, created_at ASC, rowid ASC
                 LIMIT 1",
                params![encode_instant(now)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(queue_err)?;

        let Some((id, kind, payload, attempts)) = row else {
            return Ok(None);
        };

        let attempt = attempts + 1;
        conn.execute(
            "UPDATE jobs SET status = 'in_flight', attempts = ?1, updated_at = ?2 WHERE id = ?3",
            params![attempt, encode_instant(now), id],
        )
        .map_err(queue_err)?;

        Ok(Some(ClaimedJob {
            id,
            kind,
            payload,
            attempt,
        }))
    }

    /// Record successful completion; old completed records are evicted FIFO
    /// beyond the retention limit.
    pub fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs SET status = 'completed', last_error = NULL, updated_at = ?1
             WHERE id = ?2",
            params![encode_instant(now), id],
        )
        .map_err(queue_err)?;
        prune(&conn, JobStatus::Completed, self.keep_completed)
    }

    /// Record a handler failure. Schedules a retry with exponential backoff,
    /// or marks the job failed once attempts are exhausted.
    pub fn fail(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<FailureOutcome> {
        let conn = self.lock()?;
        let attempts: u32 = conn
            .query_row(
                "SELECT attempts FROM jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(queue_err)?;

        if attempts >= self.max_attempts {
            conn.execute(
                "UPDATE jobs SET status = 'failed', last_error = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![error, encode_instant(now), id],
            )
            .map_err(queue_err)?;
            prune(&conn, JobStatus::Failed, self.keep_failed)?;
            return Ok(FailureOutcome::Failed);
        }

        let next_eligible_at = now
            + chrono::Duration::from_std(self.backoff_after(attempts))
                .unwrap_or_else(|_| chrono::Duration::seconds(2));
        conn.execute(
            "UPDATE jobs SET status = 'retrying', last_error = ?1,
                    next_eligible_at = ?2, updated_at = ?3
             WHERE id = ?4",
            params![error, encode_instant(next_eligible_at), encode_instant(now), id],
        )
        .map_err(queue_err)?;
        Ok(FailureOutcome::Retrying { next_eligible_at })
    }

    /// Fail a job with no retry, for programmer errors such as a payload
    /// that no longer deserializes.
    pub fn fail_permanently(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs SET status = 'failed', last_error = ?1, updated_at = ?2 WHERE id = ?3",
            params![error, encode_instant(now), id],
        )
        .map_err(queue_err)?;
        prune(&conn, JobStatus::Failed, self.keep_failed)
    }

    /// Jobs still awaiting delivery (pending or retrying).
    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'retrying')",
                [],
                |row| row.get(0),
            )
            .map_err(queue_err)?;
        Ok(count as usize)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, kind, status, priority, attempts, next_eligible_at, last_error, created_at
             FROM jobs WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(queue_err)
    }

    /// Retained failed-job records, newest first.
    pub fn failed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs_with_status(JobStatus::Failed)
    }

    /// Retained completed-job records, newest first.
    pub fn completed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs_with_status(JobStatus::Completed)
    }

    fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, status, priority, attempts, next_eligible_at, last_error, created_at
                 FROM jobs WHERE status = ?1 ORDER BY updated_at DESC",
            )
            .map_err(queue_err)?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_record)
            .map_err(queue_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(queue_err)
    }

    fn insert(&self, kind: &str, payload: &str, priority: i64) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = encode_instant(Utc::now());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, kind, payload, priority, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
            params![id, kind, payload, priority, now],
        )
        .map_err(queue_err)?;
        Ok(id)
    }

    /// Insert a raw job row, bypassing payload typing. Test hook for rows
    /// written by older code versions.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, kind: &str, payload: &str, priority: i64) -> Result<String> {
        self.insert(kind, payload, priority)
    }
}

#[async_trait]
impl NotificationSink for EmailQueue {
    async fn enqueue(&self, payload: NotificationPayload) -> Result<String> {
        let kind = payload.kind();
        let priority = payload.priority();
        let raw = serde_json::to_string(&payload)?;
        let id = self.insert(kind.as_str(), &raw, priority)?;
        tracing::info!(job_id = %id, kind = kind.as_str(), priority, "Email job enqueued");
        Ok(id)
    }
}

fn prune(conn: &Connection, status: JobStatus, keep: usize) -> Result<()> {
    conn.execute(
        "DELETE FROM jobs WHERE status = ?1 AND id NOT IN (
            SELECT id FROM jobs WHERE status = ?1
            ORDER BY updated_at DESC, created_at DESC, rowid DESC LIMIT ?2
        )",
        params![status.as_str(), keep as i64],
    )
    .map_err(queue_err)?;
    Ok(())
}

/// Fixed-width RFC 3339 UTC with nanoseconds: lexicographic order in SQL
/// matches chronological order, and instants round-trip exactly.
fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_instant(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn instant_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_instant(&raw, idx)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(2)?;
    Ok(JobRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        priority: row.get(3)?,
        attempts: row.get(4)?,
        next_eligible_at: match row.get::<_, Option<String>>(5)? {
            Some(raw) => Some(parse_instant(&raw, 5)?),
            None => None,
        },
        last_error: row.get(6)?,
        created_at: instant_col(row, 7)?,
    })
}

fn queue_err(e: rusqlite::Error) -> AppError {
    AppError::Queue(e.to_string())
}
