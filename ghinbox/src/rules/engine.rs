use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::models::RuleDbModel;
use crate::database::repositories::{NotificationRepository, RuleRepository, TagRepository};
use crate::query::{QueryBuilder, include_anywhere};
use crate::rules::{ActionApplier, ActionTarget, RuleActions};
use crate::{Error, Result};

/// Rows fetched per page when applying a rule to existing notifications.
pub const DEFAULT_APPLY_PAGE_SIZE: i64 = 100;

fn default_apply_page_size() -> i64 {
    DEFAULT_APPLY_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEngineConfig {
    #[serde(default = "default_apply_page_size")]
    pub apply_page_size: i64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            apply_page_size: DEFAULT_APPLY_PAGE_SIZE,
        }
    }
}

impl RuleEngineConfig {
    pub fn with_apply_page_size(mut self, page_size: i64) -> Self {
        self.apply_page_size = page_size.max(1);
        self
    }
}

/// Outcome of applying one rule to existing notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkApplyReport {
    /// Matches reported by the query.
    pub total: i64,
    /// Rows the actions were attempted on.
    pub processed: usize,
    /// Of `processed`, rows where at least one action failed.
    pub failed: usize,
    pub pages: usize,
    pub skipped_disabled: bool,
}

pub struct RuleEngine {
    notifications: Arc<dyn NotificationRepository>,
    rules: Arc<dyn RuleRepository>,
    query_builder: Arc<dyn QueryBuilder>,
    applier: ActionApplier,
    config: RuleEngineConfig,
}

impl RuleEngine {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        rules: Arc<dyn RuleRepository>,
        tags: Arc<dyn TagRepository>,
        query_builder: Arc<dyn QueryBuilder>,
    ) -> Self {
        Self {
            applier: ActionApplier::new(notifications.clone(), tags),
            notifications,
            rules,
            query_builder,
            config: RuleEngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RuleEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The query a rule matches with. A linked view wins over the rule's own
    /// query.
    pub async fn resolve_predicate(&self, user_id: &str, rule: &RuleDbModel) -> Result<String> {
        if let Some(view_id) = rule.view_id.as_deref().filter(|id| !id.is_empty()) {
            let view = self.rules.get_view(user_id, view_id).await?;
            return match view.query.as_deref().map(str::trim) {
                Some(query) if !query.is_empty() => Ok(query.to_string()),
                _ => Err(Error::validation(format!(
                    "view {} has no query defined",
                    view.id
                ))),
            };
        }

        match rule.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => Ok(query.to_string()),
            _ => Err(Error::validation(format!(
                "rule {} has neither query nor view",
                rule.id
            ))),
        }
    }

    /// Apply a rule's actions to every notification it currently matches,
    /// wherever it lives (inbox, archive, filtered).
    ///
    /// Matches are collected page by page before any action runs, so actions
    /// that change whether a row matches cannot shift later pages. Only the
    /// identifiers of each match are kept.
    pub async fn apply_rule_to_existing(
        &self,
        user_id: &str,
        rule_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkApplyReport> {
        let rule = self.rules.get_rule(user_id, rule_id).await?;
        if !rule.enabled {
            info!("Rule {} is disabled, not applying", rule_id);
            return Ok(BulkApplyReport {
                skipped_disabled: true,
                ..Default::default()
            });
        }

        let actions = RuleActions::from_json(&rule.actions)?;
        let predicate = include_anywhere(&self.resolve_predicate(user_id, &rule).await?);
        let page_size = self.config.apply_page_size.max(1);

        let mut report = BulkApplyReport::default();
        let mut matches: Vec<ActionTarget> = Vec::new();
        let mut offset = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let built = self
                .query_builder
                .build_query(&predicate, page_size, offset)?;
            let page = self
                .notifications
                .list_notifications_from_query(user_id, &built)
                .await?;

            report.total = page.total;
            report.pages += 1;
            let rows = page.notifications.len() as i64;
            matches.extend(page.notifications.iter().map(ActionTarget::from));
            offset += page_size;

            if rows < page_size || matches.len() as i64 >= report.total {
                break;
            }
        }

        for target in &matches {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.processed += 1;
            if let Err(e) = self.applier.apply(user_id, target, &actions).await {
                report.failed += 1;
                warn!(
                    rule_id = %rule_id,
                    github_id = %target.github_id,
                    error = %e,
                    "Failed to apply rule actions"
                );
            }
        }

        info!(
            "Applied rule {} to {} notifications ({} failed, {} pages)",
            rule_id, report.processed, report.failed, report.pages
        );
        Ok(report)
    }

    /// Run every enabled rule against one notification, in display order.
    ///
    /// All matching rules apply; later rules win where actions overlap. A rule
    /// that cannot be evaluated counts as not matching.
    pub async fn match_and_apply_rules(&self, user_id: &str, notification_id: i64) -> Result<bool> {
        let notification = self
            .notifications
            .get_notification_by_id(user_id, notification_id)
            .await?;
        let target = ActionTarget::from(&notification);
        let rules = self.rules.list_enabled_rules_ordered(user_id).await?;

        let mut matched_any = false;
        for rule in &rules {
            match self.rule_matches(user_id, rule, notification_id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!(rule_id = %rule.id, error = %e, "Rule could not be evaluated");
                    continue;
                }
            }
            matched_any = true;

            let actions = match RuleActions::from_json(&rule.actions) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Invalid rule actions");
                    continue;
                }
            };
            if let Err(e) = self.applier.apply(user_id, &target, &actions).await {
                warn!(
                    rule_id = %rule.id,
                    github_id = %target.github_id,
                    error = %e,
                    "Some rule actions failed"
                );
            }
        }

        Ok(matched_any)
    }

    async fn rule_matches(
        &self,
        user_id: &str,
        rule: &RuleDbModel,
        notification_id: i64,
    ) -> Result<bool> {
        let predicate = self.resolve_predicate(user_id, rule).await?;
        let mut built = self.query_builder.build_query(&predicate, 1, 0)?;
        built.pin_to_notification(notification_id);
        let page = self
            .notifications
            .list_notifications_from_query(user_id, &built)
            .await?;
        Ok(page.total > 0)
    }
}
