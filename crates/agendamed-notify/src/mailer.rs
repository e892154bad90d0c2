//! Mailer implementations and payload-to-email rendering.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use agendamed_core::config::SmtpConfig;
use agendamed_core::error::{AppError, Result};
use agendamed_core::traits::Mailer;
use agendamed_core::types::{Email, NotificationPayload};

/// Render a job payload into a plain email. Template rendering proper is
/// out of scope; these are the minimal operational texts.
pub fn render(payload: &NotificationPayload) -> Email {
    match payload {
        NotificationPayload::NewDoctor {
            doctor_email,
            doctor_name,
        } => Email {
            to: doctor_email.clone(),
            subject: "Cadastro recebido".into(),
            body: format!(
                "Olá {doctor_name}, recebemos seu cadastro. \
                 Ele será analisado pela administração da clínica."
            ),
        },
        NotificationPayload::NewAppointment {
            patient_email,
            patient_name,
            appointment_date,
        } => Email {
            to: patient_email.clone(),
            subject: "Consulta confirmada".into(),
            body: format!("Olá {patient_name}, sua consulta foi agendada para {appointment_date}."),
        },
        NotificationPayload::CancelledAppointment {
            patient_email,
            patient_name,
            appointment_date,
        } => Email {
            to: patient_email.clone(),
            subject: "Consulta cancelada".into(),
            body: format!(
                "Olá {patient_name}, sua consulta de {appointment_date} foi cancelada."
            ),
        },
        NotificationPayload::ApprovedDoctor {
            doctor_email,
            doctor_name,
        } => Email {
            to: doctor_email.clone(),
            subject: "Cadastro aprovado".into(),
            body: format!("Olá {doctor_name}, seu cadastro foi aprovado. Bem-vindo!"),
        },
        NotificationPayload::RejectedDoctor {
            doctor_email,
            doctor_name,
        } => Email {
            to: doctor_email.clone(),
            subject: "Cadastro não aprovado".into(),
            body: format!(
                "Olá {doctor_name}, infelizmente seu cadastro não foi aprovado desta vez."
            ),
        },
    }
}

/// SMTP mailer over lettre's tokio transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::Mailer(format!("SMTP relay setup failed: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from = config
            .from
            .parse()
            .map_err(|e| AppError::Mailer(format!("Invalid from address: {e}")))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| AppError::Mailer(format!("Invalid recipient {}: {e}", email.to)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .body(email.body)
            .map_err(|e| AppError::Mailer(format!("Failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Mailer(format!("SMTP send failed: {e}")))?;
        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Mailer that only logs. Used when SMTP is not configured (local
/// development) so the worker pipeline stays exercisable end to end.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (log only)");
        Ok(())
    }
}
