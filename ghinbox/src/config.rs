//! Process configuration read from the environment.

use std::fmt;
use std::path::PathBuf;

use github_api::ClientConfig;

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:ghinbox.db?mode=rwc";
pub const DEFAULT_USER_ID: &str = "default";

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub github_token: Option<String>,
    /// Overrides the public GitHub API, e.g. for GitHub Enterprise.
    pub github_api_url: Option<String>,
    pub github_per_page: Option<usize>,
    pub user_id: String,
    pub log_dir: Option<PathBuf>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("github_api_url", &self.github_api_url)
            .field("github_per_page", &self.github_per_page)
            .field("user_id", &self.user_id)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let github_per_page = match get("GITHUB_PER_PAGE") {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                Error::config(format!("GITHUB_PER_PAGE must be a positive integer, got '{}'", raw))
            })?),
            None => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            github_token: get("GITHUB_TOKEN"),
            github_api_url: get("GITHUB_API_URL"),
            github_per_page,
            user_id: get("GHINBOX_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            log_dir: get("GHINBOX_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(url) = &self.github_api_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(per_page) = self.github_per_page {
            config = config.with_per_page(per_page);
        }
        config
    }
}
