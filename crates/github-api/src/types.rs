//! Wire types for the `/notifications` endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One notification thread as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationThread {
    pub id: String,
    pub repository: RepositorySnapshot,
    pub subject: Subject,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub subscription_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub latest_comment_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Subject {
    pub fn is_pull_request(&self) -> bool {
        self.kind == "PullRequest"
    }
}

/// The subset of repository metadata kept alongside each notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub id: i64,
    #[serde(default)]
    pub node_id: String,
    pub name: String,
    pub full_name: String,
    pub owner: SimpleUser,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleUser {
    pub login: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}
