//! Appointment, blocked-date, and availability types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Patient,
    Doctor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "PATIENT",
            UserRole::Doctor => "DOCTOR",
            UserRole::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(Self::Scheduled),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A booked consultation.
///
/// `date` is the zone-normalized UTC instant of the slot; `time` is the
/// HH:mm slot label it was booked under. The (doctor_id, date, time) tuple
/// is unique among non-cancelled appointments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub date: DateTime<Utc>,
    pub time: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    /// Patient contact snapshot, carried for notification payloads.
    pub patient_name: String,
    pub patient_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking request as received from the (out-of-scope) HTTP layer:
/// local date and slot strings, not yet zone-normalized.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointment {
    pub patient_id: String,
    pub doctor_id: String,
    /// YYYY-MM-DD in the clinic zone.
    pub date: String,
    /// One of the canonical daily slots (HH:mm).
    pub time: String,
    pub notes: Option<String>,
    pub patient_name: String,
    pub patient_email: String,
}

/// Field changes for an existing appointment. `None` means "leave as is".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointment {
    /// YYYY-MM-DD in the clinic zone.
    pub date: Option<String>,
    pub time: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

/// Resolved, store-level version of [`UpdateAppointment`].
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

/// Store-level creation record with the zone-normalized instant resolved.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: DateTime<Utc>,
    pub time: String,
    pub notes: Option<String>,
    pub patient_name: String,
    pub patient_email: String,
}

/// A (date, time) pair occupied by a non-cancelled appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupiedSlot {
    pub date: DateTime<Utc>,
    pub time: String,
}

/// A calendar day a doctor has marked fully unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDate {
    pub id: String,
    pub doctor_id: String,
    /// Zone-normalized midnight of the blocked day.
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One bookable time within a day; `available` is derived at query time,
/// never stored.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub time: String,
    pub available: bool,
}

/// Availability for a single calendar day. Blocked days carry an empty
/// `times` list; no slots are surfaced at all.
#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub times: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Multi-day availability view for one doctor: one entry per calendar day
/// in the period, in ascending order.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityWindow {
    pub doctor_id: String,
    pub period: Period,
    pub availability: Vec<DayAvailability>,
}
