//! Tag repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::TagDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_tag(&self, user_id: &str, id: &str) -> Result<TagDbModel>;
    /// Idempotent: assigning an already-assigned tag is not an error.
    async fn assign_tag_to_entity(
        &self,
        user_id: &str,
        tag_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<()>;
    async fn remove_tag_assignment(
        &self,
        user_id: &str,
        tag_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<()>;
    async fn list_tag_ids_for_entity(
        &self,
        user_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<String>>;
}

pub struct SqlxTagRepository {
    pool: SqlitePool,
}

impl SqlxTagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_tag(&self, user_id: &str, id: &str) -> Result<TagDbModel> {
        sqlx::query_as::<_, TagDbModel>("SELECT * FROM tags WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Tag", id))
    }

    async fn assign_tag_to_entity(
        &self,
        user_id: &str,
        tag_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<()> {
        retry_on_sqlite_busy("assign_tag_to_entity", || async {
            sqlx::query(
                r#"
                INSERT INTO tag_assignments (tag_id, user_id, entity_type, entity_id, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(tag_id, entity_type, entity_id) DO NOTHING
                "#,
            )
            .bind(tag_id)
            .bind(user_id)
            .bind(entity_type)
            .bind(entity_id)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn remove_tag_assignment(
        &self,
        user_id: &str,
        tag_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<()> {
        retry_on_sqlite_busy("remove_tag_assignment", || async {
            sqlx::query(
                r#"
                DELETE FROM tag_assignments
                WHERE user_id = ? AND tag_id = ? AND entity_type = ? AND entity_id = ?
                "#,
            )
            .bind(user_id)
            .bind(tag_id)
            .bind(entity_type)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_tag_ids_for_entity(
        &self,
        user_id: &str,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT tag_id FROM tag_assignments
            WHERE user_id = ? AND entity_type = ? AND entity_id = ?
            ORDER BY tag_id
            "#,
        )
        .bind(user_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
