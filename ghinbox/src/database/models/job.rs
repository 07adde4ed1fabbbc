use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Queue holding one job per fetched notification thread.
pub const QUEUE_PROCESS_NOTIFICATION: &str = "process_notification";

pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

/// Job status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for `scheduled_at` to pass.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Out of attempts, or failed with an error that retrying cannot fix.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Failed => "FAILED",
        }
    }
}

/// A row of the `jobs` table. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: i64,
    pub queue: String,
    pub user_id: String,
    pub payload: Vec<u8>,
    pub status: String,
    /// Incremented on every claim.
    pub attempts: i64,
    pub max_attempts: i64,
    pub scheduled_at: i64,
    pub started_at: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobDbModel {
    pub fn get_status(&self) -> Option<JobStatus> {
        self.status.parse().ok()
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// A job to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub queue: String,
    pub user_id: String,
    pub payload: Vec<u8>,
    pub max_attempts: i64,
    pub scheduled_at: i64,
}

impl NewJob {
    pub fn new(
        queue: impl Into<String>,
        user_id: impl Into<String>,
        payload: Vec<u8>,
        scheduled_at: i64,
    ) -> Self {
        Self {
            queue: queue.into(),
            user_id: user_id.into(),
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_at,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Row counts per status for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobQueueStats {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
}
