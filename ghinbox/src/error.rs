//! Application-wide error types.

use thiserror::Error;

use crate::rules::ActionErrors;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("GitHub API error: {0}")]
    Github(#[from] github_api::GithubError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Enqueue error: {0}")]
    Enqueue(String),

    #[error("Rule actions failed: {0}")]
    RuleActions(ActionErrors),

    #[error("Cleanup aborted after deleting {deleted} notifications: {source}")]
    CleanupAborted {
        deleted: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the job that produced this error may be retried later.
    ///
    /// Upstream errors defer to the GitHub classifier. Local preconditions and
    /// corrupt data never become valid by retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Github(e) => github_api::is_retriable_error(e),
            Self::DatabaseSqlx(_) | Self::Enqueue(_) | Self::Io(_) | Self::Cancelled => true,
            Self::CleanupAborted { source, .. } => source.is_retriable(),
            Self::Migration(_)
            | Self::Serialization(_)
            | Self::NotFound { .. }
            | Self::Validation(_)
            | Self::Configuration(_)
            | Self::Query(_)
            | Self::RuleActions(_)
            | Self::Other(_) => false,
        }
    }
}
