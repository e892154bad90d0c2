//! Scheduling engine: booking rules, availability windows, blocked dates.
//!
//! All writes go through the [`AvailabilityStore`]; the engine's own slot
//! pre-check only exists to produce a friendly error before hitting the
//! store's unique constraint. Notification enqueueing is best effort: a
//! queue failure is logged and the booking still succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Months, NaiveDate};

use agendamed_core::error::{AppError, Result};
use agendamed_core::slots::{is_valid_slot, parse_date, SlotCalendar};
use agendamed_core::traits::{AvailabilityStore, NotificationSink};
use agendamed_core::types::{
    Appointment, AppointmentPatch, AppointmentStatus, AvailabilityWindow, BlockedDate,
    CreateAppointment, NewAppointment, NotificationPayload, Period, UpdateAppointment, UserRole,
};

use crate::availability::build_window;

/// How far ahead the availability view and blocked dates reach.
const WINDOW_MONTHS: u32 = 3;

pub struct SchedulingEngine {
    store: Arc<dyn AvailabilityStore>,
    notifications: Arc<dyn NotificationSink>,
    calendar: SlotCalendar,
}

impl SchedulingEngine {
    pub fn new(
        store: Arc<dyn AvailabilityStore>,
        notifications: Arc<dyn NotificationSink>,
        calendar: SlotCalendar,
    ) -> Self {
        Self {
            store,
            notifications,
            calendar,
        }
    }

    /// Book a slot for a patient. The slot must be one of the canonical
    /// daily times, on a future day that the doctor has not blocked, and
    /// not already taken by a non-cancelled appointment.
    pub async fn create_appointment(&self, request: CreateAppointment) -> Result<Appointment> {
        if !is_valid_slot(&request.time) {
            return Err(AppError::validation(format!(
                "Time must be one of the clinic's daily slots: {}",
                request.time
            )));
        }
        let day = parse_date(&request.date)?;
        if day <= self.calendar.today() {
            return Err(AppError::validation(
                "Appointments can only be booked for future dates",
            ));
        }
        let instant = self.calendar.combine(&request.date, &request.time)?;

        if self
            .store
            .is_slot_taken(&request.doctor_id, instant, &request.time)
            .await?
        {
            return Err(AppError::conflict("This time slot is already booked"));
        }
        self.ensure_day_not_blocked(&request.doctor_id, day).await?;

        let appointment = self
            .store
            .create_appointment(NewAppointment {
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                date: instant,
                time: request.time,
                notes: request.notes,
                patient_name: request.patient_name,
                patient_email: request.patient_email,
            })
            .await?;

        tracing::info!(
            appointment_id = %appointment.id,
            doctor_id = %appointment.doctor_id,
            slot = %self.calendar.format_display(appointment.date),
            "Appointment booked"
        );
        self.notify(NotificationPayload::NewAppointment {
            patient_email: appointment.patient_email.clone(),
            patient_name: appointment.patient_name.clone(),
            appointment_date: self.calendar.format_display(appointment.date),
        })
        .await;

        Ok(appointment)
    }

    /// Apply field changes to an appointment. Moving it to another date or
    /// time re-runs the same slot and blocked-day checks as booking.
    pub async fn update_appointment(
        &self,
        id: &str,
        update: UpdateAppointment,
    ) -> Result<Appointment> {
        let existing = self.get_appointment(id).await?;

        if let Some(time) = &update.time {
            if !is_valid_slot(time) {
                return Err(AppError::validation(format!(
                    "Time must be one of the clinic's daily slots: {time}"
                )));
            }
        }

        let mut patch = AppointmentPatch {
            status: update.status,
            notes: update.notes,
            ..AppointmentPatch::default()
        };

        if update.date.is_some() || update.time.is_some() {
            let date = update.date.clone().unwrap_or_else(|| {
                self.calendar
                    .local_date(existing.date)
                    .format("%Y-%m-%d")
                    .to_string()
            });
            let time = update.time.clone().unwrap_or_else(|| existing.time.clone());
            let day = parse_date(&date)?;
            if day <= self.calendar.today() {
                return Err(AppError::validation(
                    "Appointments can only be moved to future dates",
                ));
            }
            let instant = self.calendar.combine(&date, &time)?;

            if instant != existing.date || time != existing.time {
                if self
                    .store
                    .is_slot_taken(&existing.doctor_id, instant, &time)
                    .await?
                {
                    return Err(AppError::conflict("This time slot is already booked"));
                }
                self.ensure_day_not_blocked(&existing.doctor_id, day).await?;
            }
            patch.date = Some(instant);
            patch.time = Some(time);
        }

        self.store.update_appointment(id, patch).await
    }

    /// Cancel an appointment. Only the owning patient or the assigned
    /// doctor may cancel; the freed slot becomes bookable again immediately.
    pub async fn cancel_appointment(
        &self,
        id: &str,
        caller_id: &str,
        caller_role: UserRole,
    ) -> Result<Appointment> {
        let appointment = self.get_appointment(id).await?;

        let allowed = match caller_role {
            UserRole::Patient => appointment.patient_id == caller_id,
            UserRole::Doctor => appointment.doctor_id == caller_id,
            UserRole::Admin => false,
        };
        if !allowed {
            return Err(AppError::forbidden(
                "You do not have permission to cancel this appointment",
            ));
        }
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(AppError::conflict("Appointment is already cancelled"));
        }

        let cancelled = self.store.cancel_appointment(id).await?;

        tracing::info!(appointment_id = %cancelled.id, "Appointment cancelled");
        self.notify(NotificationPayload::CancelledAppointment {
            patient_email: cancelled.patient_email.clone(),
            patient_name: cancelled.patient_name.clone(),
            appointment_date: self.calendar.format_display(cancelled.date),
        })
        .await;

        Ok(cancelled)
    }

    pub async fn get_appointment(&self, id: &str) -> Result<Appointment> {
        self.store
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Appointment not found"))
    }

    /// All appointments a patient owns or a doctor is assigned to, ordered
    /// by date then time.
    pub async fn list_appointments(
        &self,
        user_id: &str,
        role: UserRole,
    ) -> Result<Vec<Appointment>> {
        self.store.appointments_for_user(user_id, role).await
    }

    /// Day-by-day availability for a doctor from today through three months
    /// ahead. Occupied slots and blocked days are each fetched in a single
    /// range query for the whole window.
    pub async fn list_availability(&self, doctor_id: &str) -> Result<AvailabilityWindow> {
        let start = self.calendar.today();
        let end = start
            .checked_add_months(Months::new(WINDOW_MONTHS))
            .unwrap_or(start);

        let window_start = self.calendar.start_of_local_day(start);
        let window_end = self.calendar.end_of_local_day(end);

        let occupied = self
            .store
            .appointments_in_range(doctor_id, window_start, window_end)
            .await?;
        let blocked = self
            .store
            .blocked_dates_in_range(doctor_id, window_start, window_end)
            .await?;

        let mut booked: HashMap<NaiveDate, HashSet<String>> = HashMap::new();
        for slot in occupied {
            booked
                .entry(self.calendar.local_date(slot.date))
                .or_default()
                .insert(slot.time);
        }
        let blocked_days: HashSet<NaiveDate> = blocked
            .into_iter()
            .map(|date| self.calendar.local_date(date))
            .collect();

        Ok(AvailabilityWindow {
            doctor_id: doctor_id.to_string(),
            period: Period {
                start_date: start,
                end_date: end,
            },
            availability: build_window(start, end, &blocked_days, &booked),
        })
    }

    /// Mark a whole day unavailable for a doctor. The day must be at least
    /// tomorrow and at most three months out. Appointments already booked
    /// on that day are left untouched.
    pub async fn block_date(
        &self,
        doctor_id: &str,
        date: &str,
        reason: Option<String>,
    ) -> Result<BlockedDate> {
        let day = parse_date(date)?;
        let today = self.calendar.today();
        let min = today + Duration::days(1);
        let max = today
            .checked_add_months(Months::new(WINDOW_MONTHS))
            .unwrap_or(today);

        if day < min {
            return Err(AppError::validation(format!(
                "Cannot block dates with less than 24 hours in advance. \
                 Minimum date allowed: {}",
                self.calendar.format_day(min)
            )));
        }
        if day > max {
            return Err(AppError::validation(format!(
                "Cannot block dates beyond {WINDOW_MONTHS} months from today. \
                 Maximum date allowed: {}",
                self.calendar.format_day(max)
            )));
        }

        let midnight = self.calendar.midnight(date)?;
        let blocked = self
            .store
            .create_blocked_date(doctor_id, midnight, reason)
            .await?;
        tracing::info!(doctor_id, date, "Date blocked");
        Ok(blocked)
    }

    /// Unblock a previously blocked day.
    pub async fn cancel_blocked_date(&self, doctor_id: &str, date: &str) -> Result<BlockedDate> {
        let midnight = self.calendar.midnight(date)?;
        let removed = self.store.delete_blocked_date(doctor_id, midnight).await?;
        tracing::info!(doctor_id, date, "Date unblocked");
        Ok(removed)
    }

    async fn ensure_day_not_blocked(&self, doctor_id: &str, day: NaiveDate) -> Result<()> {
        let blocked = self
            .store
            .blocked_dates_in_range(
                doctor_id,
                self.calendar.start_of_local_day(day),
                self.calendar.end_of_local_day(day),
            )
            .await?;
        if blocked.is_empty() {
            Ok(())
        } else {
            Err(AppError::conflict("This date is blocked for the doctor"))
        }
    }

    async fn notify(&self, payload: NotificationPayload) {
        if let Err(e) = self.notifications.enqueue(payload).await {
            tracing::warn!("Appointment saved but notification could not be queued: {e}");
        }
    }
}
