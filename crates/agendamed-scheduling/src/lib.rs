//! # Agendamed Scheduling
//! Booking rules for the clinic's fixed daily slot grid: appointment
//! creation, update and cancellation, doctor-blocked dates, and the
//! three-month day-by-day availability view.
//!
//! Persistence and notification delivery live behind the core traits; the
//! engine is only concerned with the rules that tie them together.

pub mod availability;
pub mod engine;

pub use engine::SchedulingEngine;
