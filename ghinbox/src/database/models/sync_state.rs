use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, opt_ms_to_datetime};

/// Per-user sync bookkeeping. All timestamps are epoch milliseconds.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct SyncStateDbModel {
    pub user_id: String,
    pub last_successful_poll: Option<i64>,
    /// Never moves backwards.
    pub latest_notification_at: Option<i64>,
    /// Set once, when the initial sync finishes.
    pub initial_sync_completed_at: Option<i64>,
    /// Never moves forwards.
    pub oldest_notification_synced_at: Option<i64>,
    pub updated_at: i64,
}

impl SyncStateDbModel {
    pub fn latest_notification(&self) -> Option<DateTime<Utc>> {
        opt_ms_to_datetime(self.latest_notification_at)
    }

    pub fn oldest_notification(&self) -> Option<DateTime<Utc>> {
        opt_ms_to_datetime(self.oldest_notification_synced_at)
    }

    pub fn initial_sync_completed(&self) -> bool {
        self.initial_sync_completed_at.is_some()
    }
}

/// Fields to write. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStateUpdate {
    pub last_successful_poll: Option<i64>,
    pub latest_notification_at: Option<i64>,
    pub initial_sync_completed_at: Option<i64>,
    pub oldest_notification_synced_at: Option<i64>,
}

impl SyncStateUpdate {
    pub fn with_last_successful_poll(mut self, at: DateTime<Utc>) -> Self {
        self.last_successful_poll = Some(datetime_to_ms(at));
        self
    }

    pub fn with_latest_notification(mut self, at: DateTime<Utc>) -> Self {
        self.latest_notification_at = Some(datetime_to_ms(at));
        self
    }

    pub fn with_initial_sync_completed(mut self, at: DateTime<Utc>) -> Self {
        self.initial_sync_completed_at = Some(datetime_to_ms(at));
        self
    }

    pub fn with_oldest_notification(mut self, at: DateTime<Utc>) -> Self {
        self.oldest_notification_synced_at = Some(datetime_to_ms(at));
        self
    }
}
