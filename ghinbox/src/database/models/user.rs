//! User model and the JSON settings documents stored on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub id: String,
    pub github_username: Option<String>,
    /// JSON-encoded `SyncSettings`.
    pub sync_settings: Option<String>,
    /// JSON-encoded `RetentionSettings`.
    pub retention_settings: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserDbModel {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: id.into(),
            github_username: None,
            sync_settings: None,
            retention_settings: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sync_settings(mut self, settings: &SyncSettings) -> Result<Self> {
        self.sync_settings = Some(serde_json::to_string(settings)?);
        Ok(self)
    }

    pub fn with_retention_settings(mut self, settings: &RetentionSettings) -> Result<Self> {
        self.retention_settings = Some(serde_json::to_string(settings)?);
        Ok(self)
    }

    pub fn sync_settings(&self) -> Result<Option<SyncSettings>> {
        decode_settings(self.sync_settings.as_deref())
    }

    pub fn retention_settings(&self) -> Result<Option<RetentionSettings>> {
        decode_settings(self.retention_settings.as_deref())
    }
}

fn decode_settings<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
    }
}

/// How the first sync for a user is bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_sync_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_sync_max_count: Option<usize>,
    #[serde(default)]
    pub initial_sync_unread_only: bool,
    #[serde(default)]
    pub setup_completed: bool,
}

fn default_retention_days() -> i64 {
    90
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_true")]
    pub protect_starred: bool,
    #[serde(default = "default_true")]
    pub protect_tagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: default_retention_days(),
            protect_starred: true,
            protect_tagged: true,
            last_cleanup_at: None,
        }
    }
}
