//! Notification worker: consumes the email queue with bounded concurrency.
//!
//! One job's failure never aborts the worker or other in-flight jobs;
//! handler errors go back to the queue's retry policy, and payloads that no
//! longer deserialize fail permanently (programmer error, not transient).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Semaphore};

use agendamed_core::error::Result;
use agendamed_core::traits::Mailer;

use crate::mailer::render;
use crate::queue::{ClaimedJob, EmailQueue, FailureOutcome};

pub struct NotificationWorker {
    queue: Arc<EmailQueue>,
    mailer: Arc<dyn Mailer>,
    concurrency: usize,
    poll_interval: Duration,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<EmailQueue>,
        mailer: Arc<dyn Mailer>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            mailer,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Run until `shutdown` flips to true: claim eligible jobs, process up
    /// to `concurrency` of them in flight, then drain before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(concurrency = self.concurrency, "Notification worker started");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        while !*shutdown.borrow() {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown signal
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match self.queue.claim_next(Utc::now()) {
                Ok(Some(job)) => {
                    let queue = Arc::clone(&self.queue);
                    let mailer = Arc::clone(&self.mailer);
                    tokio::spawn(async move {
                        process_job(&queue, mailer.as_ref(), job, Utc::now()).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!("Failed to claim job: {e}");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        // Graceful shutdown: stop claiming, let in-flight jobs finish.
        let _drain = semaphore.acquire_many(self.concurrency as u32).await;
        tracing::info!("Notification worker stopped");
    }

    /// Claim and process at most one job inline at `now`. Returns whether a
    /// job was processed. Used by tests to drive the retry state machine
    /// without a real timer.
    pub async fn process_one(&self, now: DateTime<Utc>) -> Result<bool> {
        match self.queue.claim_next(now)? {
            Some(job) => {
                process_job(&self.queue, self.mailer.as_ref(), job, now).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

async fn process_job(queue: &EmailQueue, mailer: &dyn Mailer, job: ClaimedJob, now: DateTime<Utc>) {
    let payload = match job.parse_payload() {
        Ok(payload) => payload,
        Err(e) => {
            // Unknown job type: programmer error, never retried.
            tracing::error!(job_id = %job.id, kind = %job.kind, "Failing job permanently: {e}");
            if let Err(e) = queue.fail_permanently(&job.id, &e.to_string(), now) {
                tracing::error!(job_id = %job.id, "Could not record permanent failure: {e}");
            }
            return;
        }
    };

    tracing::info!(
        job_id = %job.id,
        kind = payload.kind().as_str(),
        attempt = job.attempt,
        "Processing email job"
    );

    match mailer.send(render(&payload)).await {
        Ok(()) => {
            if let Err(e) = queue.complete(&job.id, now) {
                tracing::error!(job_id = %job.id, "Could not record completion: {e}");
            } else {
                tracing::info!(job_id = %job.id, "Job completed");
            }
        }
        Err(send_err) => match queue.fail(&job.id, &send_err.to_string(), now) {
            Ok(FailureOutcome::Retrying { next_eligible_at }) => {
                tracing::warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    retry_at = %next_eligible_at,
                    "Job failed, will retry: {send_err}"
                );
            }
            Ok(FailureOutcome::Failed) => {
                tracing::error!(
                    job_id = %job.id,
                    attempts = job.attempt,
                    "Job failed permanently after exhausting retries: {send_err}"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, "Could not record failure: {e}");
            }
        },
    }
}
