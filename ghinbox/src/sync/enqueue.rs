use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::clock::Clock;
use crate::database::models::{DEFAULT_MAX_ATTEMPTS, NewJob, QUEUE_PROCESS_NOTIFICATION};
use crate::database::repositories::JobRepository;

/// Hands serialized threads to whatever runs the processing jobs.
#[async_trait]
pub trait NotificationEnqueuer: Send + Sync {
    async fn enqueue_process_notification(&self, user_id: &str, data: Vec<u8>) -> Result<()>;
}

/// Writes one row per thread to the `jobs` table. A job is durable once this
/// returns, so sync state may advance past it.
pub struct JobTableEnqueuer {
    jobs: Arc<dyn JobRepository>,
    clock: Clock,
    max_attempts: i64,
}

impl JobTableEnqueuer {
    pub fn new(jobs: Arc<dyn JobRepository>, clock: Clock) -> Self {
        Self {
            jobs,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[async_trait]
impl NotificationEnqueuer for JobTableEnqueuer {
    async fn enqueue_process_notification(&self, user_id: &str, data: Vec<u8>) -> Result<()> {
        let now = (self.clock)().timestamp_millis();
        let job = NewJob::new(QUEUE_PROCESS_NOTIFICATION, user_id, data, now)
            .with_max_attempts(self.max_attempts);
        self.jobs.enqueue_job(&job, now).await?;
        Ok(())
    }
}
