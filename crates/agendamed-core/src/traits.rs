//! Capability traits at the seams of the scheduling core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Appointment, AppointmentPatch, BlockedDate, Email, NewAppointment, NotificationPayload,
    OccupiedSlot, UserRole,
};

/// Read and mediated-write access to persisted appointments and blocked
/// dates. The scheduling engine never touches the store any other way.
///
/// Implementations must enforce slot uniqueness, (doctor_id, date, time)
/// unique among non-cancelled appointments, at the storage level and map
/// violations to `AppError::Conflict`. The engine's pre-check only produces
/// a friendlier error; the constraint is the authoritative guard.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// True if a non-cancelled appointment occupies this exact
    /// (doctor, date, time).
    async fn is_slot_taken(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
        time: &str,
    ) -> Result<bool>;

    /// Blocked dates for a doctor within [start, end].
    async fn blocked_dates_in_range(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;

    /// Occupied (date, time) pairs for a doctor within [start, end],
    /// excluding cancelled appointments.
    async fn appointments_in_range(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OccupiedSlot>>;

    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>>;

    /// All appointments owned by a patient or assigned to a doctor,
    /// ordered by date then time.
    async fn appointments_for_user(
        &self,
        user_id: &str,
        role: UserRole,
    ) -> Result<Vec<Appointment>>;

    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment>;

    async fn update_appointment(&self, id: &str, patch: AppointmentPatch) -> Result<Appointment>;

    /// Mark an appointment CANCELLED, freeing its slot.
    async fn cancel_appointment(&self, id: &str) -> Result<Appointment>;

    async fn create_blocked_date(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<BlockedDate>;

    async fn delete_blocked_date(&self, doctor_id: &str, date: DateTime<Utc>)
        -> Result<BlockedDate>;
}

/// Accepts notification jobs for asynchronous delivery.
///
/// Acceptance implies durable at-least-once delivery: once `enqueue`
/// returns Ok, the job survives process restarts until a worker completes
/// it or exhausts its retries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Enqueue a job; returns its id.
    async fn enqueue(&self, payload: NotificationPayload) -> Result<String>;
}

/// Sends a single rendered email. Implementations own their I/O timeout.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}
