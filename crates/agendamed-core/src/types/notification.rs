//! Notification job payloads and email types.

use serde::{Deserialize, Serialize};

/// Appointment-related jobs claim ahead of doctor lifecycle emails.
/// Lower number is processed first; no ordering promise is made to callers.
pub const PRIORITY_APPOINTMENT: i64 = 1;
pub const PRIORITY_DOCTOR_LIFECYCLE: i64 = 2;

/// Kind of notification email.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailType {
    NewDoctor,
    NewAppointment,
    CancelledAppointment,
    ApprovedDoctor,
    RejectedDoctor,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::NewDoctor => "NEW_DOCTOR",
            EmailType::NewAppointment => "NEW_APPOINTMENT",
            EmailType::CancelledAppointment => "CANCELLED_APPOINTMENT",
            EmailType::ApprovedDoctor => "APPROVED_DOCTOR",
            EmailType::RejectedDoctor => "REJECTED_DOCTOR",
        }
    }
}

/// Typed job payload. `appointment_date` fields are pre-formatted display
/// strings (zone-localized), not raw instants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPayload {
    NewDoctor {
        doctor_email: String,
        doctor_name: String,
    },
    NewAppointment {
        patient_email: String,
        patient_name: String,
        appointment_date: String,
    },
    CancelledAppointment {
        patient_email: String,
        patient_name: String,
        appointment_date: String,
    },
    ApprovedDoctor {
        doctor_email: String,
        doctor_name: String,
    },
    RejectedDoctor {
        doctor_email: String,
        doctor_name: String,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> EmailType {
        match self {
            NotificationPayload::NewDoctor { .. } => EmailType::NewDoctor,
            NotificationPayload::NewAppointment { .. } => EmailType::NewAppointment,
            NotificationPayload::CancelledAppointment { .. } => EmailType::CancelledAppointment,
            NotificationPayload::ApprovedDoctor { .. } => EmailType::ApprovedDoctor,
            NotificationPayload::RejectedDoctor { .. } => EmailType::RejectedDoctor,
        }
    }

    /// Queue priority derived from the payload kind.
    pub fn priority(&self) -> i64 {
        match self.kind() {
            EmailType::NewAppointment | EmailType::CancelledAppointment => PRIORITY_APPOINTMENT,
            _ => PRIORITY_DOCTOR_LIFECYCLE,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            NotificationPayload::NewDoctor { doctor_email, .. }
            | NotificationPayload::ApprovedDoctor { doctor_email, .. }
            | NotificationPayload::RejectedDoctor { doctor_email, .. } => doctor_email,
            NotificationPayload::NewAppointment { patient_email, .. }
            | NotificationPayload::CancelledAppointment { patient_email, .. } => patient_email,
        }
    }
}

/// A rendered email, ready for the mailer. Template rendering itself is out
/// of scope; subject and body are plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tag_names() {
        let payload = NotificationPayload::NewAppointment {
            patient_email: "ana@example.com".into(),
            patient_name: "Ana".into(),
            appointment_date: "01/12/2024 às 09:00".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "NEW_APPOINTMENT");
        assert_eq!(json["data"]["patient_email"], "ana@example.com");
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = NotificationPayload::CancelledAppointment {
            patient_email: "ana@example.com".into(),
            patient_name: "Ana".into(),
            appointment_date: "25/12/2024 às 10:30".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: NotificationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_unknown_type_fails_to_parse() {
        let raw = r#"{"type":"SMS_REMINDER","data":{}}"#;
        assert!(serde_json::from_str::<NotificationPayload>(raw).is_err());
    }

    #[test]
    fn test_priorities() {
        let appointment = NotificationPayload::NewAppointment {
            patient_email: "a@b.c".into(),
            patient_name: "A".into(),
            appointment_date: "x".into(),
        };
        let doctor = NotificationPayload::ApprovedDoctor {
            doctor_email: "d@b.c".into(),
            doctor_name: "D".into(),
        };
        assert_eq!(appointment.priority(), PRIORITY_APPOINTMENT);
        assert_eq!(doctor.priority(), PRIORITY_DOCTOR_LIFECYCLE);
        assert!(appointment.priority() < doctor.priority());
    }

    #[test]
    fn test_recipient() {
        let payload = NotificationPayload::NewDoctor {
            doctor_email: "dr@example.com".into(),
            doctor_name: "Dr".into(),
        };
        assert_eq!(payload.recipient(), "dr@example.com");
    }
}
