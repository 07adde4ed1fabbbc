//! Rule and view models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored (predicate, actions) pair. The predicate is either the rule's own
/// `query` or the query of the linked view.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RuleDbModel {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub query: Option<String>,
    pub view_id: Option<String>,
    /// JSON-encoded `RuleActions`.
    pub actions: String,
    pub enabled: bool,
    pub display_order: i64,
    pub created_at: i64,
}

/// A named, reusable query.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ViewDbModel {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub query: Option<String>,
    pub created_at: i64,
}
