//! Worker side of the durable job queue.
//!
//! Each claimed job is acked (deleted) on success. On failure it goes back to
//! the queue with exponential backoff while it is retriable and has attempts
//! left; otherwise it is dead-lettered with its last error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::clock::Clock;
use crate::database::models::{JobDbModel, QUEUE_PROCESS_NOTIFICATION};
use crate::database::repositories::JobRepository;
use crate::error::Error;
use crate::processor::{NotificationProcessor, ProcessOutcome, RuleOutcome};

/// Runs one "process notification" job.
#[async_trait]
pub trait NotificationJobHandler: Send + Sync {
    async fn handle(&self, user_id: &str, data: &[u8]) -> Result<ProcessOutcome>;
}

#[async_trait]
impl NotificationJobHandler for NotificationProcessor {
    async fn handle(&self, user_id: &str, data: &[u8]) -> Result<ProcessOutcome> {
        NotificationProcessor::handle(self, user_id, data).await
    }
}

/// Configuration for the job worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueConfig {
    /// Delay before the first retry; doubles per attempt.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// A job claimed longer ago than this is assumed abandoned.
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_visibility_timeout_ms() -> u64 {
    300_000
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            visibility_timeout_ms: default_visibility_timeout_ms(),
        }
    }
}

impl JobQueueConfig {
    /// Backoff after the `attempts`-th failed try: base, 2x base, 4x base, ...
    pub fn retry_delay(&self, attempts: i64) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 32) as u32;
        let delay = self
            .base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Counts from one pass over the job queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDrainReport {
    pub processed: usize,
    pub created: usize,
    pub rules_matched: usize,
    pub failed: usize,
    /// Failed jobs scheduled for another attempt.
    pub retried: usize,
    /// Failed jobs moved to the `FAILED` status.
    pub dead_lettered: usize,
    /// Abandoned claims returned to the queue before draining.
    pub reclaimed: u64,
    /// Stopped early; unclaimed jobs stay queued.
    pub cancelled: bool,
}

pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn NotificationJobHandler>,
    clock: Clock,
    config: JobQueueConfig,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        handler: Arc<dyn NotificationJobHandler>,
        clock: Clock,
    ) -> Self {
        Self {
            jobs,
            handler,
            clock,
            config: JobQueueConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobQueueConfig) -> Self {
        self.config = config;
        self
    }

    fn now_ms(&self) -> i64 {
        (self.clock)().timestamp_millis()
    }

    /// Run every job that is currently due, then return.
    ///
    /// Cancellation is checked before each claim. A job that was already
    /// claimed runs to completion, and everything unclaimed stays in the table
    /// for the next drain.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<JobDrainReport> {
        let mut report = JobDrainReport::default();

        let now = self.now_ms();
        let timeout = i64::try_from(self.config.visibility_timeout_ms).unwrap_or(i64::MAX);
        report.reclaimed = self
            .jobs
            .reset_stale_jobs(now.saturating_sub(timeout), now)
            .await?;
        if report.reclaimed > 0 {
            info!("Reclaimed {} abandoned jobs", report.reclaimed);
        }

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(job) = self
                .jobs
                .dequeue_job(QUEUE_PROCESS_NOTIFICATION, self.now_ms())
                .await?
            else {
                break;
            };
            report.processed += 1;

            match self.handler.handle(&job.user_id, &job.payload).await {
                Ok(outcome) => {
                    if outcome.created {
                        report.created += 1;
                    }
                    if let RuleOutcome::Applied { matched: true } = outcome.rules {
                        report.rules_matched += 1;
                    }
                    // Left in PROCESSING, the job is reclaimed later and
                    // re-ingested, which is idempotent.
                    if let Err(e) = self.jobs.ack_job(job.id).await {
                        error!(job_id = job.id, error = %e, "Failed to ack job");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    match self.nack(&job, &e).await {
                        Ok(true) => report.retried += 1,
                        Ok(false) => report.dead_lettered += 1,
                        Err(nack_err) => {
                            error!(job_id = job.id, error = %nack_err, "Failed to nack job")
                        }
                    }
                }
            }
        }

        debug!(
            "Processed {} jobs ({} new, {} failed, {} retried)",
            report.processed, report.created, report.failed, report.retried
        );
        Ok(report)
    }

    /// Reschedule or dead-letter a failed job. Returns whether it will run again.
    async fn nack(&self, job: &JobDbModel, err: &Error) -> Result<bool> {
        let now = self.now_ms();
        let message = err.to_string();

        if !err.is_retriable() || job.attempts_exhausted() {
            warn!(
                job_id = job.id,
                user_id = %job.user_id,
                attempts = job.attempts,
                retriable = err.is_retriable(),
                error = %err,
                "Notification job dead-lettered"
            );
            self.jobs.fail_job(job.id, &message, now).await?;
            return Ok(false);
        }

        let delay = self.config.retry_delay(job.attempts);
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        warn!(
            job_id = job.id,
            user_id = %job.user_id,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            retry_in = ?delay,
            error = %err,
            "Notification job failed, will retry"
        );
        self.jobs
            .retry_job(job.id, now.saturating_add(delay_ms), &message, now)
            .await?;
        Ok(true)
    }
}
