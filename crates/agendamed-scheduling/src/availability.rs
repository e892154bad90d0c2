//! Pure construction of the day-by-day availability view.
//!
//! The engine fetches occupied slots and blocked days for the whole window
//! in one pass each; this module only merges them against the slot grid.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use agendamed_core::slots::daily_slots;
use agendamed_core::types::{DayAvailability, TimeSlot};

/// One entry per calendar day in [start, end], ascending. A blocked day
/// yields an empty `times` list; every other day lists all slots with
/// booked ones flagged unavailable.
pub fn build_window(
    start: NaiveDate,
    end: NaiveDate,
    blocked: &HashSet<NaiveDate>,
    booked: &HashMap<NaiveDate, HashSet<String>>,
) -> Vec<DayAvailability> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        let times = if blocked.contains(&current) {
            Vec::new()
        } else {
            let taken = booked.get(&current);
            daily_slots()
                .map(|time| TimeSlot {
                    time: time.to_string(),
                    available: !taken.is_some_and(|t| t.contains(time)),
                })
                .collect()
        };
        days.push(DayAvailability {
            date: current,
            times,
        });
        let Some(next) = current.succ_opt() else {
            break;
        };
        current = next;
    }
    days
}
