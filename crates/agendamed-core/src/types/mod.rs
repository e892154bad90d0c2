//! Domain types shared across crates.

pub mod appointment;
pub mod notification;

pub use appointment::{
    Appointment, AppointmentPatch, AppointmentStatus, AvailabilityWindow, BlockedDate,
    CreateAppointment, DayAvailability, NewAppointment, OccupiedSlot, Period, TimeSlot,
    UpdateAppointment, UserRole,
};
pub use notification::{Email, EmailType, NotificationPayload};
