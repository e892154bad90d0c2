//! Typed notification facade over the queue.
//!
//! Callers outside the scheduling engine (doctor lifecycle, admin approval
//! flows) go through these helpers instead of building payloads by hand.

use std::sync::Arc;

use agendamed_core::error::Result;
use agendamed_core::traits::NotificationSink;
use agendamed_core::types::NotificationPayload;

pub struct NotificationService {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationService {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn send_new_appointment_notification(
        &self,
        appointment_date: &str,
        patient_email: &str,
        patient_name: &str,
    ) -> Result<String> {
        self.send(NotificationPayload::NewAppointment {
            patient_email: patient_email.into(),
            patient_name: patient_name.into(),
            appointment_date: appointment_date.into(),
        })
        .await
    }

    pub async fn send_cancelled_appointment_notification(
        &self,
        appointment_date: &str,
        patient_email: &str,
        patient_name: &str,
    ) -> Result<String> {
        self.send(NotificationPayload::CancelledAppointment {
            patient_email: patient_email.into(),
            patient_name: patient_name.into(),
            appointment_date: appointment_date.into(),
        })
        .await
    }

    pub async fn send_new_doctor_notification(
        &self,
        doctor_email: &str,
        doctor_name: &str,
    ) -> Result<String> {
        self.send(NotificationPayload::NewDoctor {
            doctor_email: doctor_email.into(),
            doctor_name: doctor_name.into(),
        })
        .await
    }

    pub async fn send_approved_doctor_notification(
        &self,
        doctor_email: &str,
        doctor_name: &str,
    ) -> Result<String> {
        self.send(NotificationPayload::ApprovedDoctor {
            doctor_email: doctor_email.into(),
            doctor_name: doctor_name.into(),
        })
        .await
    }

    pub async fn send_rejected_doctor_notification(
        &self,
        doctor_email: &str,
        doctor_name: &str,
    ) -> Result<String> {
        self.send(NotificationPayload::RejectedDoctor {
            doctor_email: doctor_email.into(),
            doctor_name: doctor_name.into(),
        })
        .await
    }

    async fn send(&self, payload: NotificationPayload) -> Result<String> {
        let kind = payload.kind();
        let recipient = payload.recipient().to_string();
        match self.sink.enqueue(payload).await {
            Ok(id) => {
                tracing::info!(kind = kind.as_str(), %recipient, "Notification queued");
                Ok(id)
            }
            Err(e) => {
                tracing::error!(kind = kind.as_str(), %recipient, "Error queueing notification: {e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EmailQueue;
    use agendamed_core::config::QueueConfig;
    use chrono::Utc;

    #[tokio::test]
    async fn test_service_enqueues_typed_jobs() {
        let queue = Arc::new(EmailQueue::in_memory(&QueueConfig::default()).unwrap());
        let service = NotificationService::new(Arc::clone(&queue) as Arc<dyn NotificationSink>);

        service
            .send_new_doctor_notification("dr@example.com", "Dr. Silva")
            .await
            .unwrap();
        service
            .send_cancelled_appointment_notification("25/12/2024 às 10:30", "ana@example.com", "Ana")
            .await
            .unwrap();

        assert_eq!(queue.pending_count().unwrap(), 2);
        // Appointment-related job claims first despite later enqueue
        let job = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(job.kind, "CANCELLED_APPOINTMENT");
    }
}
