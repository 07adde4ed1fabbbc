//! Retention cleanup for archived notifications.
//!
//! Deletes archived notifications past the user's retention window in small
//! batches, then removes pull requests nothing points at any more.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, days_before};
use crate::database::models::{CleanupParams, RetentionSettings};
use crate::database::repositories::{NotificationRepository, UserRepository};
use crate::database::time::datetime_to_ms;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Rows deleted per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pause between batches so other writers get the lock.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_batch_size() -> u32 {
    100
}

fn default_batch_delay_ms() -> u64 {
    10
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl CleanupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = ms;
        self
    }
}

/// Why a cleanup run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CleanupSkipReason {
    UserNotFound,
    InvalidSettings,
    NotConfigured,
    Disabled,
    InvalidRetentionDays,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub notifications_deleted: u64,
    pub pull_requests_deleted: u64,
    pub skipped: Option<CleanupSkipReason>,
    /// The sweep stopped early; `notifications_deleted` is what was committed.
    pub cancelled: bool,
}

impl CleanupResult {
    fn skipped(reason: CleanupSkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Explicit parameters for an on-demand cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualCleanup {
    pub retention_days: i64,
    pub protect_starred: bool,
    pub protect_tagged: bool,
}

impl From<&RetentionSettings> for ManualCleanup {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            retention_days: settings.retention_days,
            protect_starred: settings.protect_starred,
            protect_tagged: settings.protect_tagged,
        }
    }
}

pub struct RetentionCleanup {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    config: CleanupConfig,
    clock: Clock,
}

impl RetentionCleanup {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        clock: Clock,
    ) -> Self {
        Self {
            notifications,
            users,
            config: CleanupConfig::default(),
            clock,
        }
    }

    pub fn with_config(mut self, config: CleanupConfig) -> Self {
        self.config = config;
        self
    }

    /// Run cleanup with the user's stored retention settings.
    pub async fn run_cleanup(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CleanupResult> {
        let user = match self.users.get_user(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                return Ok(CleanupResult::skipped(CleanupSkipReason::UserNotFound));
            }
            Err(e) => return Err(e),
        };

        let mut settings = match user.retention_settings() {
            Ok(Some(settings)) => settings,
            Ok(None) => return Ok(CleanupResult::skipped(CleanupSkipReason::NotConfigured)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Unreadable retention settings");
                return Ok(CleanupResult::skipped(CleanupSkipReason::InvalidSettings));
            }
        };
        if !settings.enabled {
            debug!("Retention cleanup disabled for {}", user_id);
            return Ok(CleanupResult::skipped(CleanupSkipReason::Disabled));
        }
        if settings.retention_days <= 0 {
            return Ok(CleanupResult::skipped(CleanupSkipReason::InvalidRetentionDays));
        }

        let result = self
            .sweep(user_id, ManualCleanup::from(&settings), cancel)
            .await?;
        if result.cancelled {
            return Ok(result);
        }

        settings.last_cleanup_at = Some((self.clock)());
        if let Err(e) = self
            .users
            .update_user_retention_settings(user_id, &settings)
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to record cleanup time");
        }

        Ok(result)
    }

    /// Run cleanup with explicit parameters, ignoring stored settings.
    pub async fn run_manual_cleanup(
        &self,
        user_id: &str,
        params: ManualCleanup,
        cancel: &CancellationToken,
    ) -> Result<CleanupResult> {
        if params.retention_days <= 0 {
            return Ok(CleanupResult::skipped(CleanupSkipReason::InvalidRetentionDays));
        }
        self.sweep(user_id, params, cancel).await
    }

    /// How many notifications a cleanup with these parameters would delete.
    pub async fn count_eligible(&self, user_id: &str, params: ManualCleanup) -> Result<u64> {
        if params.retention_days <= 0 {
            return Err(Error::validation("retention days must be positive"));
        }
        let params = self.cleanup_params(params);
        self.notifications
            .count_eligible_for_cleanup(user_id, &params)
            .await
    }

    /// The user's stored retention settings, or the defaults.
    pub async fn retention_settings(&self, user_id: &str) -> Result<RetentionSettings> {
        let user = self.users.get_user(user_id).await?;
        Ok(user.retention_settings()?.unwrap_or_default())
    }

    /// Notifications updated before this instant are eligible. A retention
    /// period reaching past the earliest representable date keeps everything.
    pub fn cutoff(&self, retention_days: i64) -> DateTime<Utc> {
        days_before((self.clock)(), retention_days).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn cleanup_params(&self, params: ManualCleanup) -> CleanupParams {
        CleanupParams {
            cutoff_ms: datetime_to_ms(self.cutoff(params.retention_days)),
            protect_starred: params.protect_starred,
            protect_tagged: params.protect_tagged,
            batch_size: self.config.batch_size.max(1),
        }
    }

    async fn sweep(
        &self,
        user_id: &str,
        params: ManualCleanup,
        cancel: &CancellationToken,
    ) -> Result<CleanupResult> {
        let params = self.cleanup_params(params);
        let mut result = CleanupResult::default();

        info!(
            user_id = %user_id,
            cutoff_ms = params.cutoff_ms,
            protect_starred = params.protect_starred,
            protect_tagged = params.protect_tagged,
            "Starting notification cleanup"
        );

        loop {
            let deleted = self
                .notifications
                .delete_old_archived_notifications(user_id, &params)
                .await
                .map_err(|e| Error::CleanupAborted {
                    deleted: result.notifications_deleted,
                    source: Box::new(e),
                })?;
            result.notifications_deleted += deleted;

            if deleted < u64::from(params.batch_size) {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        "Cleanup for {} cancelled after deleting {} notifications",
                        user_id, result.notifications_deleted
                    );
                    result.cancelled = true;
                    return Ok(result);
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)) => {}
            }
        }

        match self.notifications.delete_orphaned_pull_requests(user_id).await {
            Ok(deleted) => result.pull_requests_deleted = deleted,
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to delete orphaned pull requests"),
        }

        info!(
            "Cleanup for {} deleted {} notifications and {} pull requests",
            user_id, result.notifications_deleted, result.pull_requests_deleted
        );
        Ok(result)
    }
}
