//! Fixtures shared by the in-crate tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use github_api::{GithubError, NotificationThread, NotificationsApi, RepositorySnapshot, SimpleUser, Subject};
use serde_json::Value;

use crate::database::models::{RetentionSettings, SyncSettings, UpsertNotification, UserDbModel};
use crate::database::repositories::{
    NotificationRepository, SqlxNotificationRepository, SqlxUserRepository, UserRepository,
};
use crate::database::{DbPool, init_pool_with_size, run_migrations};
use crate::sync::NotificationEnqueuer;
use crate::{Error, Result};

/// A migrated in-memory database. One connection, so every query sees the
/// same database.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub async fn insert_user(
    pool: &DbPool,
    id: &str,
    sync: Option<SyncSettings>,
    retention: Option<RetentionSettings>,
) {
    let mut user = UserDbModel::new(id);
    if let Some(sync) = sync {
        user = user.with_sync_settings(&sync).unwrap();
    }
    if let Some(retention) = retention {
        user = user.with_retention_settings(&retention).unwrap();
    }
    SqlxUserRepository::new(pool.clone())
        .upsert_user(&user)
        .await
        .unwrap();
}

pub async fn insert_view(pool: &DbPool, user_id: &str, id: &str, query: Option<&str>) {
    sqlx::query("INSERT INTO views (id, user_id, name, query, created_at) VALUES (?, ?, ?, ?, 0)")
        .bind(id)
        .bind(user_id)
        .bind(id)
        .bind(query)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_rule(
    pool: &DbPool,
    user_id: &str,
    id: &str,
    query: Option<&str>,
    view_id: Option<&str>,
    actions: &str,
    display_order: i64,
) {
    sqlx::query(
        "INSERT INTO rules (id, user_id, name, query, view_id, actions, enabled, display_order, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, 0)",
    )
    .bind(id)
    .bind(user_id)
    .bind(id)
    .bind(query)
    .bind(view_id)
    .bind(actions)
    .bind(display_order)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_tag(pool: &DbPool, user_id: &str, id: &str) {
    sqlx::query("INSERT INTO tags (id, user_id, name, created_at) VALUES (?, ?, ?, 0)")
        .bind(id)
        .bind(user_id)
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

pub fn thread(id: &str, updated_at: &str) -> NotificationThread {
    NotificationThread {
        id: id.to_string(),
        repository: RepositorySnapshot {
            id: 1,
            node_id: String::new(),
            name: "hello".to_string(),
            full_name: "octo/hello".to_string(),
            owner: SimpleUser {
                login: "octo".to_string(),
                id: 1,
                kind: "Organization".to_string(),
                avatar_url: String::new(),
                html_url: String::new(),
            },
            private: false,
            description: None,
            html_url: String::new(),
            fork: false,
            archived: false,
        },
        subject: Subject {
            title: format!("Thread {}", id),
            url: None,
            latest_comment_url: None,
            kind: "Issue".to_string(),
        },
        reason: "subscribed".to_string(),
        unread: true,
        updated_at: ts(updated_at),
        last_read_at: None,
        url: String::new(),
        subscription_url: String::new(),
    }
}

/// Upsert `thread` directly and return its local id.
pub async fn insert_notification(pool: &DbPool, user_id: &str, thread: &NotificationThread) -> i64 {
    SqlxNotificationRepository::new(pool.clone())
        .upsert_notification(user_id, &UpsertNotification::from_thread(thread))
        .await
        .unwrap()
}

/// Serves a fixed list of threads and records the windows it was asked for.
#[derive(Default)]
pub struct FakeApi {
    pub threads: Vec<NotificationThread>,
    pub fail_with_status: Option<u16>,
    pub subjects: Vec<(String, Value)>,
    pub calls: Mutex<Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>, bool)>>,
}

impl FakeApi {
    pub fn with_threads(threads: Vec<NotificationThread>) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }
}

#[async_trait]
impl NotificationsApi for FakeApi {
    async fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        unread_only: bool,
    ) -> github_api::Result<Vec<NotificationThread>> {
        self.calls.lock().unwrap().push((since, before, unread_only));
        if let Some(status) = self.fail_with_status {
            return Err(GithubError::Status {
                context: "notifications",
                status,
                body: String::new(),
            });
        }
        Ok(self.threads.clone())
    }

    async fn fetch_subject_raw(&self, subject_url: &str) -> github_api::Result<Option<Value>> {
        if subject_url.is_empty() {
            return Ok(None);
        }
        match self.subjects.iter().find(|(url, _)| url == subject_url) {
            Some((_, raw)) => Ok(Some(raw.clone())),
            None => Err(GithubError::Status {
                context: "subject",
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Records enqueued payloads; fails on the listed 0-based call indexes.
#[derive(Default)]
pub struct RecordingEnqueuer {
    pub fail_on: Vec<usize>,
    pub calls: Mutex<usize>,
    pub jobs: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingEnqueuer {
    pub fn failing_on(fail_on: Vec<usize>) -> Self {
        Self {
            fail_on,
            ..Default::default()
        }
    }

    pub fn enqueued_ids(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| {
                serde_json::from_slice::<NotificationThread>(data)
                    .unwrap()
                    .id
            })
            .collect()
    }
}

#[async_trait]
impl NotificationEnqueuer for RecordingEnqueuer {
    async fn enqueue_process_notification(&self, user_id: &str, data: Vec<u8>) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if self.fail_on.contains(&call) {
            return Err(Error::Enqueue("queue unavailable".to_string()));
        }
        self.jobs.lock().unwrap().push((user_id.to_string(), data));
        Ok(())
    }
}
