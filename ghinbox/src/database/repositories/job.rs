//! Job queue repository.
//!
//! Jobs are claimed with a single `UPDATE ... RETURNING`, so two workers never
//! receive the same row. Successful jobs are deleted.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{JobDbModel, JobQueueStats, JobStatus, NewJob};
use crate::database::retry::retry_on_sqlite_busy;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue_job(&self, job: &NewJob, now: i64) -> Result<i64>;
    /// Claim the oldest due job of `queue`, counting one attempt.
    async fn dequeue_job(&self, queue: &str, now: i64) -> Result<Option<JobDbModel>>;
    async fn ack_job(&self, id: i64) -> Result<()>;
    /// Put a claimed job back, to run no earlier than `scheduled_at`.
    async fn retry_job(&self, id: i64, scheduled_at: i64, error: &str, now: i64) -> Result<()>;
    /// Dead-letter a claimed job.
    async fn fail_job(&self, id: i64, error: &str, now: i64) -> Result<()>;
    /// Return jobs claimed before `started_before` to the queue.
    async fn reset_stale_jobs(&self, started_before: i64, now: i64) -> Result<u64>;
    async fn job_stats(&self, queue: &str) -> Result<JobQueueStats>;
}

pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn enqueue_job(&self, job: &NewJob, now: i64) -> Result<i64> {
        retry_on_sqlite_busy("enqueue_job", || async {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO jobs (
                    queue, user_id, payload, status, attempts, max_attempts,
                    scheduled_at, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&job.queue)
            .bind(&job.user_id)
            .bind(&job.payload)
            .bind(JobStatus::Pending.as_str())
            .bind(job.max_attempts)
            .bind(job.scheduled_at)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn dequeue_job(&self, queue: &str, now: i64) -> Result<Option<JobDbModel>> {
        retry_on_sqlite_busy("dequeue_job", || async {
            let job = sqlx::query_as::<_, JobDbModel>(
                r#"
                UPDATE jobs SET
                    status = ?,
                    attempts = attempts + 1,
                    started_at = ?,
                    updated_at = ?
                WHERE id = (
                    SELECT id FROM jobs
                    WHERE queue = ? AND status = ? AND scheduled_at <= ?
                    ORDER BY scheduled_at, id
                    LIMIT 1
                )
                RETURNING *
                "#,
            )
            .bind(JobStatus::Processing.as_str())
            .bind(now)
            .bind(now)
            .bind(queue)
            .bind(JobStatus::Pending.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
            Ok(job)
        })
        .await
    }

    async fn ack_job(&self, id: i64) -> Result<()> {
        retry_on_sqlite_busy("ack_job", || async {
            sqlx::query("DELETE FROM jobs WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn retry_job(&self, id: i64, scheduled_at: i64, error: &str, now: i64) -> Result<()> {
        retry_on_sqlite_busy("retry_job", || async {
            sqlx::query(
                r#"
                UPDATE jobs SET
                    status = ?, scheduled_at = ?, started_at = NULL,
                    last_error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(JobStatus::Pending.as_str())
            .bind(scheduled_at)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn fail_job(&self, id: i64, error: &str, now: i64) -> Result<()> {
        retry_on_sqlite_busy("fail_job", || async {
            sqlx::query("UPDATE jobs SET status = ?, last_error = ?, updated_at = ? WHERE id = ?")
                .bind(JobStatus::Failed.as_str())
                .bind(error)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn reset_stale_jobs(&self, started_before: i64, now: i64) -> Result<u64> {
        retry_on_sqlite_busy("reset_stale_jobs", || async {
            let result = sqlx::query(
                r#"
                UPDATE jobs SET status = ?, started_at = NULL, updated_at = ?
                WHERE status = ? AND started_at < ?
                "#,
            )
            .bind(JobStatus::Pending.as_str())
            .bind(now)
            .bind(JobStatus::Processing.as_str())
            .bind(started_before)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn job_stats(&self, queue: &str) -> Result<JobQueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs WHERE queue = ? GROUP BY status")
                .bind(queue)
                .fetch_all(&self.pool)
                .await?;

        let mut stats = JobQueueStats::default();
        for (status, count) in rows {
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => stats.pending = count,
                Ok(JobStatus::Processing) => stats.processing = count,
                Ok(JobStatus::Failed) => stats.failed = count,
                Err(_) => {}
            }
        }
        Ok(stats)
    }
}
