//! Repository traits and their SQLx implementations.

pub mod job;
pub mod notification;
pub mod rule;
pub mod sync_state;
pub mod tag;
pub mod user;

pub use job::{JobRepository, SqlxJobRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use rule::{RuleRepository, SqlxRuleRepository};
pub use sync_state::{SqlxSyncStateRepository, SyncStateRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
