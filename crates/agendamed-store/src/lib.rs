//! # Agendamed Store
//! SQLite-backed [`AvailabilityStore`]: appointments and blocked dates.
//!
//! The partial unique index on (doctor_id, date, time) among non-cancelled
//! rows is the authoritative guard against double booking; the scheduling
//! engine's pre-check only exists to produce a friendlier error.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use agendamed_core::error::{AppError, Result};
use agendamed_core::traits::AvailabilityStore;
use agendamed_core::types::{
    Appointment, AppointmentPatch, AppointmentStatus, BlockedDate, NewAppointment, OccupiedSlot,
    UserRole,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS appointments (
        id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        doctor_id TEXT NOT NULL,
        date TEXT NOT NULL,
        time TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'SCHEDULED',
        notes TEXT,
        patient_name TEXT NOT NULL DEFAULT '',
        patient_email TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Slot uniqueness among non-cancelled appointments. Cancelled rows fall
    -- out of the index so the slot can be rebooked.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_slot
        ON appointments(doctor_id, date, time) WHERE status != 'CANCELLED';

    CREATE INDEX IF NOT EXISTS idx_appointments_doctor_date
        ON appointments(doctor_id, date);

    CREATE TABLE IF NOT EXISTS blocked_dates (
        id TEXT PRIMARY KEY,
        doctor_id TEXT NOT NULL,
        date TEXT NOT NULL,
        reason TEXT,
        created_at TEXT NOT NULL,
        UNIQUE(doctor_id, date)
    );
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        tracing::debug!("Appointment store opened: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl AvailabilityStore for SqliteStore {
    async fn is_slot_taken(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
        time: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let taken: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM appointments
                    WHERE doctor_id = ?1 AND date = ?2 AND time = ?3
                      AND status != 'CANCELLED'
                )",
                params![doctor_id, encode_instant(date), time],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(taken)
    }

    async fn blocked_dates_in_range(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT date FROM blocked_dates
                 WHERE doctor_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![doctor_id, encode_instant(start), encode_instant(end)],
                |row| instant_col(row, 0),
            )
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn appointments_in_range(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OccupiedSlot>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, time FROM appointments
                 WHERE doctor_id = ?1 AND date >= ?2 AND date <= ?3
                   AND status != 'CANCELLED'
                 ORDER BY date ASC, time ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![doctor_id, encode_instant(start), encode_instant(end)],
                |row| {
                    Ok(OccupiedSlot {
                        date: instant_col(row, 0)?,
                        time: row.get(1)?,
                    })
                },
            )
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, patient_id, doctor_id, date, time, status, notes,
                        patient_name, patient_email, created_at, updated_at
                 FROM appointments WHERE id = ?1",
            )
            .map_err(db_err)?;
        stmt.query_row(params![id], row_to_appointment)
            .optional()
            .map_err(db_err)
    }

    async fn appointments_for_user(
        &self,
        user_id: &str,
        role: UserRole,
    ) -> Result<Vec<Appointment>> {
        let column = match role {
            UserRole::Patient => "patient_id",
            UserRole::Doctor => "doctor_id",
            // Admins go through dashboard queries, not this path.
            UserRole::Admin => return Ok(Vec::new()),
        };
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, patient_id, doctor_id, date, time, status, notes,
                        patient_name, patient_email, created_at, updated_at
                 FROM appointments WHERE {column} = ?1
                 ORDER BY date ASC, time ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], row_to_appointment)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO appointments
                (id, patient_id, doctor_id, date, time, status, notes,
                 patient_name, patient_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'SCHEDULED', ?6, ?7, ?8, ?9, ?9)",
            params![
                id,
                appointment.patient_id,
                appointment.doctor_id,
                encode_instant(appointment.date),
                appointment.time,
                appointment.notes,
                appointment.patient_name,
                appointment.patient_email,
                encode_instant(now),
            ],
        )
        .map_err(|e| write_err(e, "This time slot is already booked"))?;

        Ok(Appointment {
            id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            date: appointment.date,
            time: appointment.time,
            status: AppointmentStatus::Scheduled,
            notes: appointment.notes,
            patient_name: appointment.patient_name,
            patient_email: appointment.patient_email,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_appointment(&self, id: &str, patch: AppointmentPatch) -> Result<Appointment> {
        let existing = self
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        let updated = Appointment {
            date: patch.date.unwrap_or(existing.date),
            time: patch.time.unwrap_or(existing.time),
            status: patch.status.unwrap_or(existing.status),
            notes: patch.notes.or(existing.notes),
            updated_at: Utc::now(),
            ..existing
        };

        let conn = self.lock()?;
        conn.execute(
            "UPDATE appointments
             SET date = ?1, time = ?2, status = ?3, notes = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                encode_instant(updated.date),
                updated.time,
                updated.status.as_str(),
                updated.notes,
                encode_instant(updated.updated_at),
                id,
            ],
        )
        .map_err(|e| write_err(e, "This time slot is already booked"))?;
        Ok(updated)
    }

    async fn cancel_appointment(&self, id: &str) -> Result<Appointment> {
        let existing = self
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE appointments SET status = 'CANCELLED', updated_at = ?1 WHERE id = ?2",
            params![encode_instant(now), id],
        )
        .map_err(db_err)?;

        Ok(Appointment {
            status: AppointmentStatus::Cancelled,
            updated_at: now,
            ..existing
        })
    }

    async fn create_blocked_date(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<BlockedDate> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blocked_dates (id, doctor_id, date, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                doctor_id,
                encode_instant(date),
                reason,
                encode_instant(now)
            ],
        )
        .map_err(|e| write_err(e, "This date is already blocked"))?;

        Ok(BlockedDate {
            id,
            doctor_id: doctor_id.to_string(),
            date,
            reason,
            created_at: now,
        })
    }

    async fn delete_blocked_date(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
    ) -> Result<BlockedDate> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, doctor_id, date, reason, created_at
                 FROM blocked_dates WHERE doctor_id = ?1 AND date = ?2",
            )
            .map_err(db_err)?;
        let blocked = stmt
            .query_row(params![doctor_id, encode_instant(date)], |row| {
                Ok(BlockedDate {
                    id: row.get(0)?,
                    doctor_id: row.get(1)?,
                    date: instant_col(row, 2)?,
                    reason: row.get(3)?,
                    created_at: instant_col(row, 4)?,
                })
            })
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound("This date is not blocked".into()))?;

        conn.execute(
            "DELETE FROM blocked_dates WHERE id = ?1",
            params![blocked.id],
        )
        .map_err(db_err)?;
        Ok(blocked)
    }
}

/// Instants are stored as fixed-width RFC 3339 UTC strings so lexicographic
/// range comparisons in SQL match chronological order.
fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
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

fn row_to_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let status: String = row.get(5)?;
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        date: instant_col(row, 3)?,
        time: row.get(4)?,
        status: AppointmentStatus::parse(&status).unwrap_or(AppointmentStatus::Scheduled),
        notes: row.get(6)?,
        patient_name: row.get(7)?,
        patient_email: row.get(8)?,
        created_at: instant_col(row, 9)?,
        updated_at: instant_col(row, 10)?,
    })
}

fn db_err(e: rusqlite::Error) -> AppError {
    AppError::Database(e.to_string())
}

/// Map a unique-constraint violation on write to a Conflict with a
/// user-facing message; everything else is a database error.
fn write_err(e: rusqlite::Error, conflict_msg: &str) -> AppError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return AppError::Conflict(conflict_msg.into());
        }
    }
    db_err(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn new_appointment(doctor_id: &str, date: DateTime<Utc>, time: &str) -> NewAppointment {
        NewAppointment {
            patient_id: "patient-1".into(),
            doctor_id: doctor_id.into(),
            date,
            time: time.into(),
            notes: None,
            patient_name: "Ana Souza".into(),
            patient_email: "ana@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store();
        let date = instant(2024, 12, 1, 12, 0);
        let created = store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap();
        assert_eq!(created.status, AppointmentStatus::Scheduled);

        let fetched = store.get_appointment(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.doctor_id, "doc-1");
        assert_eq!(fetched.date, date);
        assert_eq!(fetched.time, "09:00");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        assert!(store().get_appointment("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slot_uniqueness_enforced_by_index() {
        let store = store();
        let date = instant(2024, 12, 1, 12, 0);
        store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap();

        let err = store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Different time on the same day is fine
        let other = instant(2024, 12, 1, 12, 30);
        store
            .create_appointment(new_appointment("doc-1", other, "09:30"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_slot() {
        let store = store();
        let date = instant(2024, 12, 1, 12, 0);
        let first = store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap();
        store.cancel_appointment(&first.id).await.unwrap();

        assert!(!store.is_slot_taken("doc-1", date, "09:00").await.unwrap());
        // Rebooking the freed slot succeeds
        store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_is_slot_taken() {
        let store = store();
        let date = instant(2024, 12, 1, 12, 0);
        assert!(!store.is_slot_taken("doc-1", date, "09:00").await.unwrap());

        store
            .create_appointment(new_appointment("doc-1", date, "09:00"))
            .await
            .unwrap();
        assert!(store.is_slot_taken("doc-1", date, "09:00").await.unwrap());
        // Other doctor unaffected
        assert!(!store.is_slot_taken("doc-2", date, "09:00").await.unwrap());
    }

    #[tokio::test]
    async fn test_appointments_in_range_excludes_cancelled() {
        let store = store();
        let kept = store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 0), "09:00"))
            .await
            .unwrap();
        let dropped = store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 2, 12, 0), "09:00"))
            .await
            .unwrap();
        store.cancel_appointment(&dropped.id).await.unwrap();

        let slots = store
            .appointments_in_range(
                "doc-1",
                instant(2024, 12, 1, 0, 0),
                instant(2024, 12, 31, 23, 59),
            )
            .await
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].date, kept.date);
    }

    #[tokio::test]
    async fn test_blocked_date_lifecycle() {
        let store = store();
        let day = instant(2024, 12, 25, 3, 0);

        let blocked = store
            .create_blocked_date("doc-1", day, Some("Feriado".into()))
            .await
            .unwrap();
        assert_eq!(blocked.reason.as_deref(), Some("Feriado"));

        let err = store
            .create_blocked_date("doc-1", day, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let in_range = store
            .blocked_dates_in_range("doc-1", instant(2024, 12, 1, 0, 0), instant(2025, 1, 1, 0, 0))
            .await
            .unwrap();
        assert_eq!(in_range, vec![day]);

        let removed = store.delete_blocked_date("doc-1", day).await.unwrap();
        assert_eq!(removed.id, blocked.id);

        let err = store.delete_blocked_date("doc-1", day).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_appointments_for_user_ordering() {
        let store = store();
        store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 2, 12, 0), "09:00"))
            .await
            .unwrap();
        store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 16, 30), "13:30"))
            .await
            .unwrap();
        store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 0), "09:00"))
            .await
            .unwrap();

        let mine = store
            .appointments_for_user("patient-1", UserRole::Patient)
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);
        let dates: Vec<_> = mine.iter().map(|a| (a.date, a.time.clone())).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);

        // Doctor sees the same set through their column
        let theirs = store
            .appointments_for_user("doc-1", UserRole::Doctor)
            .await
            .unwrap();
        assert_eq!(theirs.len(), 3);
    }

    #[tokio::test]
    async fn test_update_appointment_patch() {
        let store = store();
        let created = store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 0), "09:00"))
            .await
            .unwrap();

        let updated = store
            .update_appointment(
                &created.id,
                AppointmentPatch {
                    notes: Some("Retorno".into()),
                    status: Some(AppointmentStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Retorno"));
        assert_eq!(updated.status, AppointmentStatus::Completed);
        assert_eq!(updated.time, "09:00");

        let err = store
            .update_appointment("missing", AppointmentPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_into_occupied_slot_conflicts() {
        let store = store();
        store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 0), "09:00"))
            .await
            .unwrap();
        let second = store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 30), "09:30"))
            .await
            .unwrap();

        let err = store
            .update_appointment(
                &second.id,
                AppointmentPatch {
                    date: Some(instant(2024, 12, 1, 12, 0)),
                    time: Some("09:00".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_damaged_timestamp_is_reported() {
        let store = store();
        let created = store
            .create_appointment(new_appointment("doc-1", instant(2024, 12, 1, 12, 0), "09:00"))
            .await
            .unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE appointments SET date = 'not-a-timestamp' WHERE id = ?1",
                params![created.id],
            )
            .unwrap();

        let err = store.get_appointment(&created.id).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let date = instant(2024, 12, 1, 12, 0);

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store
                .create_appointment(new_appointment("doc-1", date, "09:00"))
                .await
                .unwrap()
                .id
        };

        let store = SqliteStore::open(&path).unwrap();
        let fetched = store.get_appointment(&id).await.unwrap().unwrap();
        assert_eq!(fetched.date, date);
    }
}
