//! Notification and pull request models.

use chrono::{DateTime, Utc};
use github_api::{NotificationThread, PullRequestDetails, SubjectDetails};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::database::time::datetime_to_ms;

/// A mirrored notification thread plus local triage flags.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: i64,
    pub user_id: String,
    pub github_id: String,
    pub repository_full_name: String,
    pub repository_owner: String,
    pub repository_raw: Option<String>,
    pub pull_request_id: Option<i64>,
    pub subject_type: String,
    pub subject_title: String,
    pub subject_url: Option<String>,
    pub subject_latest_comment_url: Option<String>,
    pub subject_raw: Option<String>,
    pub subject_fetched_at: Option<i64>,
    pub subject_number: Option<i64>,
    pub subject_state: Option<String>,
    pub subject_state_reason: Option<String>,
    pub subject_merged: Option<bool>,
    pub author_login: Option<String>,
    pub reason: String,
    pub github_unread: bool,
    pub github_updated_at: i64,
    pub github_last_read_at: Option<i64>,
    pub github_url: Option<String>,
    pub is_read: bool,
    pub archived: bool,
    pub muted: bool,
    pub starred: bool,
    pub filtered: bool,
    pub imported_at: i64,
    pub updated_at: i64,
}

/// Upstream columns written on every ingestion. Local flags are not part of
/// this and survive re-ingestion.
#[derive(Debug, Clone, Default)]
pub struct UpsertNotification {
    pub github_id: String,
    pub repository_full_name: String,
    pub repository_owner: String,
    pub repository_raw: Option<String>,
    pub pull_request_id: Option<i64>,
    pub subject_type: String,
    pub subject_title: String,
    pub subject_url: Option<String>,
    pub subject_latest_comment_url: Option<String>,
    pub subject_raw: Option<String>,
    pub subject_fetched_at: Option<i64>,
    pub subject_number: Option<i64>,
    pub subject_state: Option<String>,
    pub subject_state_reason: Option<String>,
    pub subject_merged: Option<bool>,
    pub author_login: Option<String>,
    pub reason: String,
    pub github_unread: bool,
    pub github_updated_at: i64,
    pub github_last_read_at: Option<i64>,
    pub github_url: Option<String>,
}

impl UpsertNotification {
    pub fn from_thread(thread: &NotificationThread) -> Self {
        Self {
            github_id: thread.id.clone(),
            repository_full_name: thread.repository.full_name.clone(),
            repository_owner: thread.repository.owner.login.clone(),
            repository_raw: serde_json::to_string(&thread.repository).ok(),
            pull_request_id: None,
            subject_type: thread.subject.kind.clone(),
            subject_title: thread.subject.title.clone(),
            subject_url: thread.subject.url.clone().filter(|u| !u.is_empty()),
            subject_latest_comment_url: thread.subject.latest_comment_url.clone(),
            reason: thread.reason.clone(),
            github_unread: thread.unread,
            github_updated_at: datetime_to_ms(thread.updated_at),
            github_last_read_at: thread.last_read_at.map(datetime_to_ms),
            github_url: Some(thread.url.clone()).filter(|u| !u.is_empty()),
            ..Default::default()
        }
    }

    /// Attach a fetched subject document and the details pulled out of it.
    pub fn with_subject(mut self, raw: &Value, fetched_at: DateTime<Utc>) -> Self {
        let details = SubjectDetails::from_raw(raw);
        self.subject_raw = Some(raw.to_string());
        self.subject_fetched_at = Some(datetime_to_ms(fetched_at));
        self.subject_number = details.number;
        self.subject_state = details.state;
        self.subject_state_reason = details.state_reason;
        self.subject_merged = details.merged;
        self.author_login = details.author_login;
        self
    }

    pub fn with_pull_request(mut self, pull_request_id: i64) -> Self {
        self.pull_request_id = Some(pull_request_id);
        self
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PullRequestDbModel {
    pub id: i64,
    pub user_id: String,
    pub repository_full_name: String,
    pub number: i64,
    pub github_id: Option<i64>,
    pub node_id: Option<String>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub draft: Option<bool>,
    pub merged: Option<bool>,
    pub author_login: Option<String>,
    pub github_created_at: Option<i64>,
    pub github_updated_at: Option<i64>,
    pub github_merged_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct UpsertPullRequest {
    pub repository_full_name: String,
    pub details: PullRequestDetails,
}

/// One page of a notification query plus the total number of matches.
#[derive(Debug, Clone, Default)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationDbModel>,
    pub total: i64,
}

/// A local triage flag that rule actions can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationFlag {
    Filtered,
    Read,
    Starred,
    Archived,
    Muted,
}

impl NotificationFlag {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Filtered => "filtered",
            Self::Read => "is_read",
            Self::Starred => "starred",
            Self::Archived => "archived",
            Self::Muted => "muted",
        }
    }
}

/// Selection for the retention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupParams {
    /// Archived notifications last updated strictly before this are eligible.
    pub cutoff_ms: i64,
    pub protect_starred: bool,
    pub protect_tagged: bool,
    pub batch_size: u32,
}
