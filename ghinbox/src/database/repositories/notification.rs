//! Notification repository.

use async_trait::async_trait;
use sqlx::query::QueryAs;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};

use crate::database::models::{
    CleanupParams, NOTIFICATION_ENTITY, NotificationDbModel, NotificationFlag, NotificationPage,
    UpsertNotification, UpsertPullRequest,
};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::datetime_to_ms;
use crate::query::{BuiltQuery, QueryArg};
use crate::{Error, Result};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn get_notification_by_github_id(
        &self,
        user_id: &str,
        github_id: &str,
    ) -> Result<NotificationDbModel>;
    async fn get_notification_by_id(&self, user_id: &str, id: i64) -> Result<NotificationDbModel>;

    /// Insert or refresh a notification keyed by `(user_id, github_id)` and
    /// return its local id. Local flags are never touched.
    async fn upsert_notification(
        &self,
        user_id: &str,
        notification: &UpsertNotification,
    ) -> Result<i64>;
    async fn upsert_pull_request(&self, user_id: &str, pull_request: &UpsertPullRequest)
    -> Result<i64>;

    async fn list_notifications_from_query(
        &self,
        user_id: &str,
        query: &BuiltQuery,
    ) -> Result<NotificationPage>;

    // Triage flags
    async fn mark_notification_filtered(&self, user_id: &str, github_id: &str) -> Result<()>;
    async fn mark_notification_read(&self, user_id: &str, github_id: &str) -> Result<()>;
    async fn star_notification(&self, user_id: &str, github_id: &str) -> Result<()>;
    async fn archive_notification(&self, user_id: &str, github_id: &str) -> Result<()>;
    async fn mute_notification(&self, user_id: &str, github_id: &str) -> Result<()>;

    // Retention
    /// Delete up to `params.batch_size` eligible notifications (and their tag
    /// assignments), returning how many were deleted.
    async fn delete_old_archived_notifications(
        &self,
        user_id: &str,
        params: &CleanupParams,
    ) -> Result<u64>;
    async fn count_eligible_for_cleanup(&self, user_id: &str, params: &CleanupParams)
    -> Result<u64>;
    async fn delete_orphaned_pull_requests(&self, user_id: &str) -> Result<u64>;
}

pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn set_flag(&self, user_id: &str, github_id: &str, flag: NotificationFlag) -> Result<()> {
        let sql = format!(
            "UPDATE notifications SET {} = 1, updated_at = ? WHERE user_id = ? AND github_id = ?",
            flag.column()
        );
        let result = retry_on_sqlite_busy("set_notification_flag", || async {
            Ok(sqlx::query(&sql)
                .bind(now_ms())
                .bind(user_id)
                .bind(github_id)
                .execute(&self.pool)
                .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Notification", github_id));
        }
        Ok(())
    }

    async fn delete_archived_batch(&self, user_id: &str, params: &CleanupParams) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT n.id FROM notifications n WHERE {} ORDER BY n.github_updated_at ASC LIMIT ?",
            eligible_predicate(params)
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(params.cutoff_ms)
            .bind(i64::from(params.batch_size))
            .fetch_all(&mut *tx)
            .await?;

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");

        let sql = format!(
            "DELETE FROM tag_assignments WHERE entity_type = ? AND entity_id IN ({})",
            placeholders
        );
        let mut delete_tags = sqlx::query(&sql).bind(NOTIFICATION_ENTITY);
        for id in &ids {
            delete_tags = delete_tags.bind(*id);
        }
        delete_tags.execute(&mut *tx).await?;

        let sql = format!("DELETE FROM notifications WHERE id IN ({})", placeholders);
        let mut delete_notifications = sqlx::query(&sql);
        for id in &ids {
            delete_notifications = delete_notifications.bind(*id);
        }
        let deleted = delete_notifications.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }
}

fn now_ms() -> i64 {
    datetime_to_ms(chrono::Utc::now())
}

/// `WHERE` body for cleanup. Binds: user_id, cutoff_ms.
fn eligible_predicate(params: &CleanupParams) -> String {
    let mut predicate =
        String::from("n.user_id = ? AND n.archived = 1 AND n.github_updated_at < ?");
    if params.protect_starred {
        predicate.push_str(" AND n.starred = 0");
    }
    if params.protect_tagged {
        predicate.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM tag_assignments ta \
             WHERE ta.entity_type = '{}' AND ta.entity_id = n.id)",
            NOTIFICATION_ENTITY
        ));
    }
    predicate
}

fn bind_query_args<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    args: &[QueryArg],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            QueryArg::Int(v) => query.bind(*v),
            QueryArg::Text(v) => query.bind(v.clone()),
            QueryArg::Bool(v) => query.bind(*v),
        };
    }
    query
}

fn where_sql(query: &BuiltQuery) -> String {
    let mut sql = String::from("n.user_id = ?");
    for clause in &query.where_clauses {
        sql.push_str(" AND (");
        sql.push_str(clause);
        sql.push(')');
    }
    sql
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn get_notification_by_github_id(
        &self,
        user_id: &str,
        github_id: &str,
    ) -> Result<NotificationDbModel> {
        sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notifications WHERE user_id = ? AND github_id = ?",
        )
        .bind(user_id)
        .bind(github_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Notification", github_id))
    }

    async fn get_notification_by_id(&self, user_id: &str, id: i64) -> Result<NotificationDbModel> {
        sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notifications WHERE user_id = ? AND id = ?",
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Notification", id.to_string()))
    }

    async fn upsert_notification(
        &self,
        user_id: &str,
        n: &UpsertNotification,
    ) -> Result<i64> {
        retry_on_sqlite_busy("upsert_notification", || async {
            let now = now_ms();
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO notifications (
                    user_id, github_id, repository_full_name, repository_owner, repository_raw,
                    pull_request_id, subject_type, subject_title, subject_url,
                    subject_latest_comment_url, subject_raw, subject_fetched_at, subject_number,
                    subject_state, subject_state_reason, subject_merged, author_login, reason,
                    github_unread, github_updated_at, github_last_read_at, github_url,
                    imported_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, github_id) DO UPDATE SET
                    repository_full_name = excluded.repository_full_name,
                    repository_owner = excluded.repository_owner,
                    repository_raw = excluded.repository_raw,
                    pull_request_id = COALESCE(excluded.pull_request_id, notifications.pull_request_id),
                    subject_type = excluded.subject_type,
                    subject_title = excluded.subject_title,
                    subject_url = excluded.subject_url,
                    subject_latest_comment_url = excluded.subject_latest_comment_url,
                    subject_raw = COALESCE(excluded.subject_raw, notifications.subject_raw),
                    subject_fetched_at = COALESCE(excluded.subject_fetched_at, notifications.subject_fetched_at),
                    subject_number = COALESCE(excluded.subject_number, notifications.subject_number),
                    subject_state = COALESCE(excluded.subject_state, notifications.subject_state),
                    subject_state_reason = COALESCE(excluded.subject_state_reason, notifications.subject_state_reason),
                    subject_merged = COALESCE(excluded.subject_merged, notifications.subject_merged),
                    author_login = COALESCE(excluded.author_login, notifications.author_login),
                    reason = excluded.reason,
                    github_unread = excluded.github_unread,
                    github_updated_at = excluded.github_updated_at,
                    github_last_read_at = excluded.github_last_read_at,
                    github_url = excluded.github_url,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
            )
            .bind(user_id)
            .bind(&n.github_id)
            .bind(&n.repository_full_name)
            .bind(&n.repository_owner)
            .bind(&n.repository_raw)
            .bind(n.pull_request_id)
            .bind(&n.subject_type)
            .bind(&n.subject_title)
            .bind(&n.subject_url)
            .bind(&n.subject_latest_comment_url)
            .bind(&n.subject_raw)
            .bind(n.subject_fetched_at)
            .bind(n.subject_number)
            .bind(&n.subject_state)
            .bind(&n.subject_state_reason)
            .bind(n.subject_merged)
            .bind(&n.author_login)
            .bind(&n.reason)
            .bind(n.github_unread)
            .bind(n.github_updated_at)
            .bind(n.github_last_read_at)
            .bind(&n.github_url)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn upsert_pull_request(
        &self,
        user_id: &str,
        pull_request: &UpsertPullRequest,
    ) -> Result<i64> {
        let pr = &pull_request.details;
        retry_on_sqlite_busy("upsert_pull_request", || async {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO pull_requests (
                    user_id, repository_full_name, number, github_id, node_id, title, state,
                    draft, merged, author_login, github_created_at, github_updated_at,
                    github_merged_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, repository_full_name, number) DO UPDATE SET
                    github_id = COALESCE(excluded.github_id, pull_requests.github_id),
                    node_id = COALESCE(excluded.node_id, pull_requests.node_id),
                    title = COALESCE(excluded.title, pull_requests.title),
                    state = COALESCE(excluded.state, pull_requests.state),
                    draft = COALESCE(excluded.draft, pull_requests.draft),
                    merged = COALESCE(excluded.merged, pull_requests.merged),
                    author_login = COALESCE(excluded.author_login, pull_requests.author_login),
                    github_created_at = COALESCE(excluded.github_created_at, pull_requests.github_created_at),
                    github_updated_at = COALESCE(excluded.github_updated_at, pull_requests.github_updated_at),
                    github_merged_at = COALESCE(excluded.github_merged_at, pull_requests.github_merged_at),
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
            )
            .bind(user_id)
            .bind(&pull_request.repository_full_name)
            .bind(pr.number)
            .bind(pr.github_id)
            .bind(&pr.node_id)
            .bind(&pr.title)
            .bind(&pr.state)
            .bind(pr.draft)
            .bind(pr.merged)
            .bind(&pr.author_login)
            .bind(pr.created_at.map(datetime_to_ms))
            .bind(pr.updated_at.map(datetime_to_ms))
            .bind(pr.merged_at.map(datetime_to_ms))
            .bind(now_ms())
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn list_notifications_from_query(
        &self,
        user_id: &str,
        query: &BuiltQuery,
    ) -> Result<NotificationPage> {
        let where_body = where_sql(query);

        let count_sql = format!("SELECT COUNT(*) FROM notifications n WHERE {}", where_body);
        let count_query = sqlx::query_as::<_, (i64,)>(&count_sql).bind(user_id);
        let (total,) = bind_query_args(count_query, &query.args)
            .fetch_one(&self.pool)
            .await?;

        let select_sql = format!(
            "SELECT n.* FROM notifications n WHERE {} \
             ORDER BY n.github_updated_at DESC, n.id DESC LIMIT ? OFFSET ?",
            where_body
        );
        let select_query = sqlx::query_as::<_, NotificationDbModel>(&select_sql).bind(user_id);
        let notifications = bind_query_args(select_query, &query.args)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(NotificationPage {
            notifications,
            total,
        })
    }

    async fn mark_notification_filtered(&self, user_id: &str, github_id: &str) -> Result<()> {
        self.set_flag(user_id, github_id, NotificationFlag::Filtered)
            .await
    }

    async fn mark_notification_read(&self, user_id: &str, github_id: &str) -> Result<()> {
        self.set_flag(user_id, github_id, NotificationFlag::Read).await
    }

    async fn star_notification(&self, user_id: &str, github_id: &str) -> Result<()> {
        self.set_flag(user_id, github_id, NotificationFlag::Starred)
            .await
    }

    async fn archive_notification(&self, user_id: &str, github_id: &str) -> Result<()> {
        self.set_flag(user_id, github_id, NotificationFlag::Archived)
            .await
    }

    async fn mute_notification(&self, user_id: &str, github_id: &str) -> Result<()> {
        self.set_flag(user_id, github_id, NotificationFlag::Muted).await
    }

    async fn delete_old_archived_notifications(
        &self,
        user_id: &str,
        params: &CleanupParams,
    ) -> Result<u64> {
        retry_on_sqlite_busy("delete_old_archived_notifications", || {
            self.delete_archived_batch(user_id, params)
        })
        .await
    }

    async fn count_eligible_for_cleanup(
        &self,
        user_id: &str,
        params: &CleanupParams,
    ) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM notifications n WHERE {}",
            eligible_predicate(params)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(params.cutoff_ms)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_orphaned_pull_requests(&self, user_id: &str) -> Result<u64> {
        retry_on_sqlite_busy("delete_orphaned_pull_requests", || async {
            let result = sqlx::query(
                r#"
                DELETE FROM pull_requests
                WHERE user_id = ?
                  AND NOT EXISTS (
                      SELECT 1 FROM notifications n WHERE n.pull_request_id = pull_requests.id
                  )
                "#,
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}
