use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::models::{NOTIFICATION_ENTITY, NotificationDbModel};
use crate::database::repositories::{NotificationRepository, TagRepository};
use crate::{Error, Result};

/// The action payload stored on a rule. Every directive is independent and
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_inbox: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_tags: Option<Vec<String>>,
}

impl RuleActions {
    /// Decode the JSON stored on a rule. An empty payload means no actions.
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "null" {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Flag actions that are switched on, in application order.
    pub fn flag_actions(&self) -> Vec<FlagAction> {
        [
            (self.skip_inbox, FlagAction::SkipInbox),
            (self.mark_read, FlagAction::MarkRead),
            (self.star, FlagAction::Star),
            (self.archive, FlagAction::Archive),
            (self.mute, FlagAction::Mute),
        ]
        .into_iter()
        .filter_map(|(enabled, action)| (enabled == Some(true)).then_some(action))
        .collect()
    }

    pub fn assign_tags(&self) -> &[String] {
        self.assign_tags.as_deref().unwrap_or_default()
    }

    pub fn remove_tags(&self) -> &[String] {
        self.remove_tags.as_deref().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.flag_actions().is_empty() && self.assign_tags().is_empty() && self.remove_tags().is_empty()
    }
}

/// A boolean directive that sets one notification flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FlagAction {
    #[strum(serialize = "skip inbox")]
    SkipInbox,
    #[strum(serialize = "mark read")]
    MarkRead,
    #[strum(serialize = "star")]
    Star,
    #[strum(serialize = "archive")]
    Archive,
    #[strum(serialize = "mute")]
    Mute,
}

/// A single attempted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Flag(FlagAction),
    AssignTag(String),
    RemoveTag(String),
}

impl From<FlagAction> for RuleAction {
    fn from(action: FlagAction) -> Self {
        Self::Flag(action)
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(action) => write!(f, "{}", action),
            Self::AssignTag(id) => write!(f, "assign tag {}", id),
            Self::RemoveTag(id) => write!(f, "remove tag {}", id),
        }
    }
}

#[derive(Debug)]
pub struct ActionFailure {
    pub action: RuleAction,
    pub error: Error,
}

/// Every action that failed while applying one action set.
#[derive(Debug, Default)]
pub struct ActionErrors(Vec<ActionFailure>);

impl ActionErrors {
    pub fn failures(&self) -> &[ActionFailure] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, action: RuleAction, error: Error) {
        self.0.push(ActionFailure { action, error });
    }

    fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::RuleActions(self))
        }
    }
}

impl fmt::Display for ActionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.action, failure.error)?;
        }
        Ok(())
    }
}

/// The identifiers an action set needs, without the rest of the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    pub id: i64,
    pub github_id: String,
}

impl From<&NotificationDbModel> for ActionTarget {
    fn from(notification: &NotificationDbModel) -> Self {
        Self {
            id: notification.id,
            github_id: notification.github_id.clone(),
        }
    }
}

/// Applies an action set to one notification.
#[derive(Clone)]
pub struct ActionApplier {
    notifications: Arc<dyn NotificationRepository>,
    tags: Arc<dyn TagRepository>,
}

impl ActionApplier {
    pub fn new(notifications: Arc<dyn NotificationRepository>, tags: Arc<dyn TagRepository>) -> Self {
        Self {
            notifications,
            tags,
        }
    }

    /// Attempt every action, then report all failures together.
    pub async fn apply(
        &self,
        user_id: &str,
        target: &ActionTarget,
        actions: &RuleActions,
    ) -> Result<()> {
        let mut errors = ActionErrors::default();
        let github_id = target.github_id.as_str();

        for action in actions.flag_actions() {
            let result = match action {
                FlagAction::SkipInbox => {
                    self.notifications
                        .mark_notification_filtered(user_id, github_id)
                        .await
                }
                FlagAction::MarkRead => {
                    self.notifications
                        .mark_notification_read(user_id, github_id)
                        .await
                }
                FlagAction::Star => self.notifications.star_notification(user_id, github_id).await,
                FlagAction::Archive => {
                    self.notifications
                        .archive_notification(user_id, github_id)
                        .await
                }
                FlagAction::Mute => self.notifications.mute_notification(user_id, github_id).await,
            };
            if let Err(e) = result {
                errors.push(action.into(), e);
            }
        }

        for tag_id in actions.assign_tags() {
            let result = match self.tags.get_tag(user_id, tag_id).await {
                Ok(_) => {
                    self.tags
                        .assign_tag_to_entity(user_id, tag_id, NOTIFICATION_ENTITY, target.id)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                errors.push(RuleAction::AssignTag(tag_id.clone()), e);
            }
        }

        for tag_id in actions.remove_tags() {
            match self.tags.get_tag(user_id, tag_id).await {
                Ok(_) => {
                    if let Err(e) = self
                        .tags
                        .remove_tag_assignment(user_id, tag_id, NOTIFICATION_ENTITY, target.id)
                        .await
                    {
                        errors.push(RuleAction::RemoveTag(tag_id.clone()), e);
                    }
                }
                // Nothing to remove for a tag that no longer exists.
                Err(e) if e.is_not_found() => {
                    debug!(tag_id = %tag_id, "Skipping removal of unknown tag");
                }
                Err(e) => errors.push(RuleAction::RemoveTag(tag_id.clone()), e),
            }
        }

        errors.into_result()
    }
}
