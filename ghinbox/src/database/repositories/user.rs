//! User repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{RetentionSettings, UserDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<UserDbModel>;
    async fn upsert_user(&self, user: &UserDbModel) -> Result<()>;
    async fn update_user_retention_settings(
        &self,
        id: &str,
        settings: &RetentionSettings,
    ) -> Result<()>;
}

pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn get_user(&self, id: &str) -> Result<UserDbModel> {
        sqlx::query_as::<_, UserDbModel>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("User", id))
    }

    async fn upsert_user(&self, user: &UserDbModel) -> Result<()> {
        retry_on_sqlite_busy("upsert_user", || async {
            sqlx::query(
                r#"
                INSERT INTO users (id, github_username, sync_settings, retention_settings, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    github_username = excluded.github_username,
                    sync_settings = excluded.sync_settings,
                    retention_settings = excluded.retention_settings,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&user.id)
            .bind(&user.github_username)
            .bind(&user.sync_settings)
            .bind(&user.retention_settings)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_user_retention_settings(
        &self,
        id: &str,
        settings: &RetentionSettings,
    ) -> Result<()> {
        let raw = serde_json::to_string(settings)?;
        let result = retry_on_sqlite_busy("update_user_retention_settings", || async {
            Ok(sqlx::query("UPDATE users SET retention_settings = ?, updated_at = ? WHERE id = ?")
                .bind(&raw)
                .bind(chrono::Utc::now().timestamp_millis())
                .bind(id)
                .execute(&self.pool)
                .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("User", id));
        }
        Ok(())
    }
}
