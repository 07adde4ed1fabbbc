use std::sync::Arc;

use async_trait::async_trait;
use github_api::{NotificationThread, NotificationsApi, PullRequestDetails};
use tracing::{debug, warn};

use crate::Result;
use crate::clock::Clock;
use crate::database::models::{UpsertNotification, UpsertPullRequest};
use crate::database::repositories::NotificationRepository;

/// Writes one remote thread into the local store.
///
/// Must be idempotent: ingesting the same thread twice leaves one row.
#[async_trait]
pub trait NotificationIngestor: Send + Sync {
    async fn process_notification(&self, user_id: &str, thread: &NotificationThread) -> Result<()>;
}

/// Ingests a thread along with its subject document when GitHub has one.
pub struct GithubIngestor {
    api: Arc<dyn NotificationsApi>,
    notifications: Arc<dyn NotificationRepository>,
    clock: Clock,
}

impl GithubIngestor {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        notifications: Arc<dyn NotificationRepository>,
        clock: Clock,
    ) -> Self {
        Self {
            api,
            notifications,
            clock,
        }
    }

    async fn attach_subject(
        &self,
        user_id: &str,
        thread: &NotificationThread,
        mut upsert: UpsertNotification,
    ) -> UpsertNotification {
        let Some(url) = thread.subject.url.as_deref().filter(|u| !u.is_empty()) else {
            return upsert;
        };

        let raw = match self.api.fetch_subject_raw(url).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return upsert,
            Err(e) => {
                warn!(github_id = %thread.id, error = %e, "Failed to fetch subject, ingesting without it");
                return upsert;
            }
        };

        if thread.subject.is_pull_request() {
            match PullRequestDetails::from_raw(&raw) {
                Some(details) => {
                    let pull_request = UpsertPullRequest {
                        repository_full_name: thread.repository.full_name.clone(),
                        details,
                    };
                    match self
                        .notifications
                        .upsert_pull_request(user_id, &pull_request)
                        .await
                    {
                        Ok(id) => upsert = upsert.with_pull_request(id),
                        Err(e) => {
                            warn!(github_id = %thread.id, error = %e, "Failed to store pull request")
                        }
                    }
                }
                None => debug!(github_id = %thread.id, "Pull request subject without a number"),
            }
        }

        upsert.with_subject(&raw, (self.clock)())
    }
}

#[async_trait]
impl NotificationIngestor for GithubIngestor {
    async fn process_notification(&self, user_id: &str, thread: &NotificationThread) -> Result<()> {
        let upsert = UpsertNotification::from_thread(thread);
        let upsert = self.attach_subject(user_id, thread, upsert).await;
        self.notifications
            .upsert_notification(user_id, &upsert)
            .await?;
        Ok(())
    }
}
