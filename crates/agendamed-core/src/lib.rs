//! # Agendamed Core
//! Shared error taxonomy, configuration, domain types, capability traits,
//! and the slot calendar for the clinic scheduling system.

pub mod config;
pub mod error;
pub mod slots;
pub mod traits;
pub mod types;

pub use config::AgendamedConfig;
pub use error::{AppError, Result};
pub use slots::{daily_slots, SlotCalendar, DAILY_SLOTS};
