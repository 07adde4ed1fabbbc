use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Entity type recorded on tag assignments for notifications.
pub const NOTIFICATION_ENTITY: &str = "notification";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TagDbModel {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TagAssignmentDbModel {
    pub tag_id: String,
    pub user_id: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub created_at: i64,
}
