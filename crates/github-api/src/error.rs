use thiserror::Error;

pub type Result<T> = std::result::Result<T, GithubError>;

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub {context} request returned {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("token cannot be empty")]
    EmptyToken,

    #[error("no token configured")]
    MissingToken,

    #[error("token validation failed: {0}")]
    TokenValidation(Box<GithubError>),
}

impl GithubError {
    /// HTTP status code carried by this error, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::TokenValidation(inner) => inner.status(),
            _ => None,
        }
    }

    /// 502 or 504 from the upstream edge.
    pub fn is_gateway(&self) -> bool {
        matches!(self.status(), Some(502) | Some(504))
    }
}
