//! # Agendamed Notify
//! Asynchronous email notifications: a durable SQLite-backed job queue with
//! explicit retry/backoff state, a bounded-concurrency worker, and mailer
//! implementations. Enqueueing is decoupled from the booking transaction;
//! a slow or failing email provider never blocks appointment scheduling.

pub mod mailer;
pub mod queue;
pub mod service;
pub mod worker;

pub use mailer::{LogMailer, SmtpMailer};
pub use queue::{ClaimedJob, EmailQueue, FailureOutcome, JobRecord, JobStatus};
pub use service::NotificationService;
pub use worker::NotificationWorker;
