//! The job handler that turns a queued thread into a local notification.

use std::sync::Arc;

use github_api::NotificationThread;
use tracing::{debug, warn};

use crate::Result;
use crate::database::repositories::NotificationRepository;
use crate::rules::RuleEngine;
use crate::sync::NotificationIngestor;

/// Why rules were not run for a processed notification.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RuleSkipReason {
    /// The notification was already stored; rules only run once.
    AlreadyExists,
}

/// Result of the best-effort rule pass. Never fails the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied { matched: bool },
    Skipped(RuleSkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub created: bool,
    pub rules: RuleOutcome,
}

pub struct NotificationProcessor {
    notifications: Arc<dyn NotificationRepository>,
    ingestor: Arc<dyn NotificationIngestor>,
    rule_engine: Arc<RuleEngine>,
}

impl NotificationProcessor {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        ingestor: Arc<dyn NotificationIngestor>,
        rule_engine: Arc<RuleEngine>,
    ) -> Self {
        Self {
            notifications,
            ingestor,
            rule_engine,
        }
    }

    /// Process one queued job payload.
    ///
    /// Only decoding and ingestion can fail the job. Rule evaluation runs for
    /// new notifications and its errors end up in [`RuleOutcome::Failed`].
    pub async fn handle(&self, user_id: &str, data: &[u8]) -> Result<ProcessOutcome> {
        let thread: NotificationThread = serde_json::from_slice(data)?;

        let existed = match self
            .notifications
            .get_notification_by_github_id(user_id, &thread.id)
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                debug!(github_id = %thread.id, error = %e, "Existence check failed, treating as new");
                false
            }
        };

        self.ingestor.process_notification(user_id, &thread).await?;

        if existed {
            return Ok(ProcessOutcome {
                created: false,
                rules: RuleOutcome::Skipped(RuleSkipReason::AlreadyExists),
            });
        }

        let rules = match self.apply_rules(user_id, &thread.id).await {
            Ok(matched) => RuleOutcome::Applied { matched },
            Err(e) => {
                warn!(github_id = %thread.id, error = %e, "Rule evaluation failed");
                RuleOutcome::Failed(e.to_string())
            }
        };

        Ok(ProcessOutcome {
            created: true,
            rules,
        })
    }

    async fn apply_rules(&self, user_id: &str, github_id: &str) -> Result<bool> {
        let stored = self
            .notifications
            .get_notification_by_github_id(user_id, github_id)
            .await?;
        self.rule_engine
            .match_and_apply_rules(user_id, stored.id)
            .await
    }
}
