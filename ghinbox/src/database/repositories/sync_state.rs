//! Sync state repository.
//!
//! The upsert enforces the state invariants itself: `latest_notification_at`
//! only moves forward, `oldest_notification_synced_at` only moves backward and
//! `initial_sync_completed_at` is written once.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{SyncStateDbModel, SyncStateUpdate};
use crate::database::retry::retry_on_sqlite_busy;

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn get_sync_state(&self, user_id: &str) -> Result<Option<SyncStateDbModel>>;
    async fn upsert_sync_state(
        &self,
        user_id: &str,
        update: &SyncStateUpdate,
    ) -> Result<SyncStateDbModel>;
}

pub struct SqlxSyncStateRepository {
    pool: SqlitePool,
}

impl SqlxSyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateRepository for SqlxSyncStateRepository {
    async fn get_sync_state(&self, user_id: &str) -> Result<Option<SyncStateDbModel>> {
        let state =
            sqlx::query_as::<_, SyncStateDbModel>("SELECT * FROM sync_state WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(state)
    }

    async fn upsert_sync_state(
        &self,
        user_id: &str,
        update: &SyncStateUpdate,
    ) -> Result<SyncStateDbModel> {
        retry_on_sqlite_busy("upsert_sync_state", || async {
            let state = sqlx::query_as::<_, SyncStateDbModel>(
                r#"
                INSERT INTO sync_state (
                    user_id, last_successful_poll, latest_notification_at,
                    initial_sync_completed_at, oldest_notification_synced_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    last_successful_poll =
                        COALESCE(excluded.last_successful_poll, sync_state.last_successful_poll),
                    latest_notification_at = CASE
                        WHEN excluded.latest_notification_at IS NULL THEN sync_state.latest_notification_at
                        WHEN sync_state.latest_notification_at IS NULL THEN excluded.latest_notification_at
                        ELSE MAX(sync_state.latest_notification_at, excluded.latest_notification_at)
                    END,
                    initial_sync_completed_at =
                        COALESCE(sync_state.initial_sync_completed_at, excluded.initial_sync_completed_at),
                    oldest_notification_synced_at = CASE
                        WHEN excluded.oldest_notification_synced_at IS NULL THEN sync_state.oldest_notification_synced_at
                        WHEN sync_state.oldest_notification_synced_at IS NULL THEN excluded.oldest_notification_synced_at
                        ELSE MIN(sync_state.oldest_notification_synced_at, excluded.oldest_notification_synced_at)
                    END,
                    updated_at = excluded.updated_at
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(update.last_successful_poll)
            .bind(update.latest_notification_at)
            .bind(update.initial_sync_completed_at)
            .bind(update.oldest_notification_synced_at)
            .bind(chrono::Utc::now().timestamp_millis())
            .fetch_one(&self.pool)
            .await?;
            Ok(state)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_test_db, ts};

    #[tokio::test]
    async fn test_latest_never_moves_backwards() {
        let pool = setup_test_db().await;
        crate::test_support::insert_user(&pool, "u1", None, None).await;
        let repo = SqlxSyncStateRepository::new(pool);

        repo.upsert_sync_state(
            "u1",
            &SyncStateUpdate::default().with_latest_notification(ts("2025-03-10T00:00:00Z")),
        )
        .await
        .unwrap();
        let state = repo
            .upsert_sync_state(
                "u1",
                &SyncStateUpdate::default().with_latest_notification(ts("2025-03-01T00:00:00Z")),
            )
            .await
            .unwrap();

        assert_eq!(state.latest_notification(), Some(ts("2025-03-10T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_oldest_never_moves_forwards_and_initial_is_set_once() {
        let pool = setup_test_db().await;
        crate::test_support::insert_user(&pool, "u1", None, None).await;
        let repo = SqlxSyncStateRepository::new(pool);

        repo.upsert_sync_state(
            "u1",
            &SyncStateUpdate::default()
                .with_oldest_notification(ts("2025-01-01T00:00:00Z"))
                .with_initial_sync_completed(ts("2025-03-01T00:00:00Z")),
        )
        .await
        .unwrap();
        let state = repo
            .upsert_sync_state(
                "u1",
                &SyncStateUpdate::default()
                    .with_oldest_notification(ts("2025-02-01T00:00:00Z"))
                    .with_initial_sync_completed(ts("2025-04-01T00:00:00Z")),
            )
            .await
            .unwrap();

        assert_eq!(state.oldest_notification(), Some(ts("2025-01-01T00:00:00Z")));
        assert_eq!(
            state.initial_sync_completed_at,
            Some(ts("2025-03-01T00:00:00Z").timestamp_millis())
        );
        assert!(state.latest_notification_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_state_is_none() {
        let pool = setup_test_db().await;
        let repo = SqlxSyncStateRepository::new(pool);
        assert!(repo.get_sync_state("nobody").await.unwrap().is_none());
    }
}
