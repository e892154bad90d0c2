//! # Agendamed CLI
//!
//! Clinic appointment scheduling core with asynchronous email notifications.
//!
//! Usage:
//!   agendamed init                         # Write default config and databases
//!   agendamed worker                       # Run the notification worker
//!   agendamed book --doctor d1 ...         # Book an appointment
//!   agendamed availability --doctor d1     # Day-by-day availability view
//!   agendamed block --doctor d1 --date ... # Block a whole day
//!   agendamed queue stats                  # Inspect the job queue

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use agendamed_core::config::AgendamedConfig;
use agendamed_core::slots::SlotCalendar;
use agendamed_core::traits::{Mailer, NotificationSink};
use agendamed_core::types::{CreateAppointment, UserRole};
use agendamed_notify::{EmailQueue, LogMailer, NotificationWorker, SmtpMailer};
use agendamed_scheduling::SchedulingEngine;
use agendamed_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "agendamed",
    version,
    about = "Clinic appointment scheduling with asynchronous email notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = "agendamed.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the databases
    Init,

    /// Run the notification worker until Ctrl+C
    Worker,

    /// Book an appointment
    Book {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        doctor: String,
        /// YYYY-MM-DD in the clinic zone
        #[arg(long)]
        date: String,
        /// One of the daily slots (HH:mm)
        #[arg(long)]
        time: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Cancel an appointment
    Cancel {
        id: String,
        /// Acting user id
        #[arg(long)]
        caller: String,
        /// patient | doctor | admin
        #[arg(long)]
        role: String,
    },

    /// List appointments for a user
    List {
        #[arg(long)]
        user: String,
        /// patient | doctor | admin
        #[arg(long)]
        role: String,
    },

    /// Day-by-day availability for the next three months
    Availability {
        #[arg(long)]
        doctor: String,
    },

    /// Block a whole day for a doctor
    Block {
        #[arg(long)]
        doctor: String,
        /// YYYY-MM-DD in the clinic zone
        #[arg(long)]
        date: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Unblock a previously blocked day
    Unblock {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        date: String,
    },

    /// Job queue inspection
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Pending, failed, and completed counts
    Stats,
    /// Failed jobs with their last error
    Failed,
}

fn parse_role(role: &str) -> Result<UserRole> {
    match role.to_ascii_lowercase().as_str() {
        "patient" => Ok(UserRole::Patient),
        "doctor" => Ok(UserRole::Doctor),
        "admin" => Ok(UserRole::Admin),
        other => anyhow::bail!("Unknown role: {other} (expected patient, doctor, or admin)"),
    }
}

fn build_engine(config: &AgendamedConfig) -> Result<(SchedulingEngine, Arc<EmailQueue>)> {
    let store = Arc::new(SqliteStore::open(Path::new(&config.database.path))?);
    let queue = Arc::new(EmailQueue::open(Path::new(&config.queue.path), &config.queue)?);
    let calendar = SlotCalendar::from_zone_name(&config.timezone)?;
    let engine = SchedulingEngine::new(
        store,
        Arc::clone(&queue) as Arc<dyn NotificationSink>,
        calendar,
    );
    Ok((engine, queue))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "agendamed=debug,agendamed_scheduling=debug,agendamed_notify=debug,agendamed_store=debug"
    } else {
        "agendamed=info,agendamed_scheduling=info,agendamed_notify=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = AgendamedConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let rendered = toml::to_string_pretty(&config)?;
            std::fs::write(&cli.config, rendered)?;
            println!("Config written to {}", cli.config.display());

            build_engine(&config)?;
            println!(
                "Databases ready: {} / {}",
                config.database.path, config.queue.path
            );
        }

        Commands::Worker => {
            let queue = Arc::new(EmailQueue::open(
                Path::new(&config.queue.path),
                &config.queue,
            )?);
            let mailer: Arc<dyn Mailer> = if config.smtp.username.is_empty() {
                tracing::warn!("SMTP not configured, emails will only be logged");
                Arc::new(LogMailer)
            } else {
                Arc::new(SmtpMailer::new(&config.smtp)?)
            };
            let worker = NotificationWorker::new(
                queue,
                mailer,
                config.worker.concurrency,
                Duration::from_millis(config.queue.poll_interval_ms),
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

            println!("Worker running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            shutdown_tx.send(true)?;
            handle.await?;
        }

        Commands::Book {
            patient,
            doctor,
            date,
            time,
            name,
            email,
            notes,
        } => {
            let (engine, _) = build_engine(&config)?;
            let calendar = SlotCalendar::from_zone_name(&config.timezone)?;
            let appointment = engine
                .create_appointment(CreateAppointment {
                    patient_id: patient,
                    doctor_id: doctor,
                    date,
                    time,
                    notes,
                    patient_name: name,
                    patient_email: email,
                })
                .await?;
            println!(
                "Booked {} for {}",
                appointment.id,
                calendar.format_display(appointment.date)
            );
        }

        Commands::Cancel { id, caller, role } => {
            let (engine, _) = build_engine(&config)?;
            let cancelled = engine
                .cancel_appointment(&id, &caller, parse_role(&role)?)
                .await?;
            println!("Cancelled {}", cancelled.id);
        }

        Commands::List { user, role } => {
            let (engine, _) = build_engine(&config)?;
            let appointments = engine.list_appointments(&user, parse_role(&role)?).await?;
            println!("{}", serde_json::to_string_pretty(&appointments)?);
        }

        Commands::Availability { doctor } => {
            let (engine, _) = build_engine(&config)?;
            let window = engine.list_availability(&doctor).await?;
            println!("{}", serde_json::to_string_pretty(&window)?);
        }

        Commands::Block {
            doctor,
            date,
            reason,
        } => {
            let (engine, _) = build_engine(&config)?;
            let blocked = engine.block_date(&doctor, &date, reason).await?;
            println!("Blocked {} for doctor {}", date, blocked.doctor_id);
        }

        Commands::Unblock { doctor, date } => {
            let (engine, _) = build_engine(&config)?;
            engine.cancel_blocked_date(&doctor, &date).await?;
            println!("Unblocked {date} for doctor {doctor}");
        }

        Commands::Queue { action } => {
            let queue = EmailQueue::open(Path::new(&config.queue.path), &config.queue)?;
            match action {
                QueueAction::Stats => {
                    println!("pending:   {}", queue.pending_count()?);
                    println!("failed:    {}", queue.failed_jobs()?.len());
                    println!("completed: {}", queue.completed_jobs()?.len());
                }
                QueueAction::Failed => {
                    for job in queue.failed_jobs()? {
                        println!(
                            "{} {} attempts={} error={}",
                            job.id,
                            job.kind,
                            job.attempts,
                            job.last_error.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
