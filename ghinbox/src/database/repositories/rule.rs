//! Rule and view repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{RuleDbModel, ViewDbModel};
use crate::{Error, Result};

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn get_rule(&self, user_id: &str, id: &str) -> Result<RuleDbModel>;
    /// Enabled rules in ascending `display_order`; ties keep creation order.
    async fn list_enabled_rules_ordered(&self, user_id: &str) -> Result<Vec<RuleDbModel>>;
    async fn get_view(&self, user_id: &str, id: &str) -> Result<ViewDbModel>;
}

pub struct SqlxRuleRepository {
    pool: SqlitePool,
}

impl SqlxRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for SqlxRuleRepository {
    async fn get_rule(&self, user_id: &str, id: &str) -> Result<RuleDbModel> {
        sqlx::query_as::<_, RuleDbModel>("SELECT * FROM rules WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Rule", id))
    }

    async fn list_enabled_rules_ordered(&self, user_id: &str) -> Result<Vec<RuleDbModel>> {
        let rules = sqlx::query_as::<_, RuleDbModel>(
            r#"
            SELECT * FROM rules
            WHERE user_id = ? AND enabled = 1
            ORDER BY display_order ASC, created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    async fn get_view(&self, user_id: &str, id: &str) -> Result<ViewDbModel> {
        sqlx::query_as::<_, ViewDbModel>("SELECT * FROM views WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("View", id))
    }
}
