use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{GithubError, Result};
use crate::paging::{DEFAULT_PAGE_SIZE, PageStep, degrade_page_size};
use crate::types::NotificationThread;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub per_page: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: GITHUB_API_BASE.to_string(),
            per_page: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("ghinbox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Zero falls back to the default page size.
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = if per_page == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            per_page
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// The remote calls the sync pipeline depends on.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    /// Fetch every notification thread in the window, following pagination
    /// until a short or empty page comes back.
    async fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        unread_only: bool,
    ) -> Result<Vec<NotificationThread>>;

    /// Fetch the raw subject document. An empty URL yields `None` without a
    /// request.
    async fn fetch_subject_raw(&self, subject_url: &str) -> Result<Option<Value>>;
}

pub struct GithubClient {
    http: Client,
    config: ClientConfig,
    base_url: Url,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        install_rustls_provider();

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            config,
            base_url,
            token: None,
        })
    }

    /// Build a client and validate `token` against the API before returning it.
    pub async fn with_token(config: ClientConfig, token: &str) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.set_token(token).await?;
        Ok(client)
    }

    /// Store the token and probe `GET /user` once to make sure it works.
    pub async fn set_token(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(GithubError::EmptyToken);
        }
        self.token = Some(token.to_string());

        if let Err(e) = self.validate_token().await {
            self.token = None;
            return Err(GithubError::TokenValidation(Box::new(e)));
        }
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn validate_token(&self) -> Result<()> {
        let url = self.endpoint("user")?;
        let response = self.request(url)?.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Status {
                context: "user",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path))?)
    }

    fn request(&self, url: Url) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(GithubError::MissingToken)?;
        Ok(self
            .http
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, ACCEPT_GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION))
    }

    fn notifications_url(
        &self,
        step: &PageStep,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        unread_only: bool,
    ) -> Result<Url> {
        let mut url = self.endpoint("notifications")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("all", if unread_only { "false" } else { "true" })
                .append_pair("per_page", &step.per_page.to_string())
                .append_pair("page", &step.page.to_string());
            if let Some(since) = since {
                query.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(before) = before {
                query.append_pair("before", &before.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<Vec<NotificationThread>> {
        let response = self.request(url)?.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Status {
                context: "notifications",
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl NotificationsApi for GithubClient {
    async fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        unread_only: bool,
    ) -> Result<Vec<NotificationThread>> {
        let mut step = PageStep::at_offset(self.config.per_page, 0);
        let mut threads: Vec<NotificationThread> = Vec::new();

        loop {
            let url = self.notifications_url(&step, since, before, unread_only)?;
            match self.fetch_page(url).await {
                Ok(page) => {
                    let received = page.len();
                    threads.extend(page.into_iter().skip(step.skip));
                    debug!(
                        "Fetched notifications page {} ({} items at per_page={})",
                        step.page, received, step.per_page
                    );
                    if received < step.per_page {
                        break;
                    }
                    step = PageStep::at_offset(step.per_page, threads.len());
                }
                Err(e) if e.is_gateway() => match degrade_page_size(step.per_page, threads.len()) {
                    Some(next) => {
                        warn!(
                            status = ?e.status(),
                            from = step.per_page,
                            to = next.per_page,
                            resume_page = next.page,
                            "Gateway error fetching notifications, retrying with a smaller page"
                        );
                        step = next;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }

        Ok(threads)
    }

    async fn fetch_subject_raw(&self, subject_url: &str) -> Result<Option<Value>> {
        let subject_url = subject_url.trim();
        if subject_url.is_empty() {
            return Ok(None);
        }

        let url = Url::parse(subject_url)?;
        let response = self.request(url)?.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Status {
                context: "subject",
                status: status.as_u16(),
                body,
            });
        }

        Ok(Some(response.json::<Value>().await?))
    }
}
