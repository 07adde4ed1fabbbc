//! Details pulled out of a raw subject document (an issue, pull request,
//! release, ...).
//!
//! Extraction is lenient: missing or mistyped fields just come back as `None`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Fields shared by most subject kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectDetails {
    pub number: Option<i64>,
    pub state: Option<String>,
    pub state_reason: Option<String>,
    pub merged: Option<bool>,
    pub author_login: Option<String>,
    pub author_id: Option<i64>,
}

impl SubjectDetails {
    pub fn from_raw(raw: &Value) -> Self {
        let author = raw
            .get("user")
            .filter(|v| v.is_object())
            .or_else(|| raw.get("sender").filter(|v| v.is_object()));

        Self {
            number: raw.get("number").and_then(Value::as_i64),
            state: non_empty_str(raw.get("state")),
            state_reason: non_empty_str(raw.get("state_reason")),
            merged: raw.get("merged").and_then(Value::as_bool),
            author_login: author.and_then(|a| non_empty_str(a.get("login"))),
            author_id: author.and_then(|a| a.get("id")).and_then(Value::as_i64),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pull request columns extracted from a `PullRequest` subject.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestDetails {
    pub github_id: Option<i64>,
    pub node_id: Option<String>,
    pub number: i64,
    pub title: Option<String>,
    pub state: Option<String>,
    pub draft: Option<bool>,
    pub merged: Option<bool>,
    pub author_login: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawPullRequest {
    id: Option<i64>,
    node_id: Option<String>,
    number: Option<i64>,
    title: Option<String>,
    state: Option<String>,
    draft: Option<bool>,
    merged: Option<bool>,
    user: Option<RawUser>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawUser {
    login: Option<String>,
}

impl PullRequestDetails {
    /// Returns `None` when the document is not shaped like a pull request or
    /// has no number.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let pr = RawPullRequest::deserialize(raw).ok()?;
        Some(Self {
            github_id: pr.id,
            node_id: pr.node_id,
            number: pr.number?,
            title: pr.title,
            state: pr.state,
            draft: pr.draft,
            merged: pr.merged,
            author_login: pr.user.and_then(|u| u.login),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            merged_at: pr.merged_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_details() {
        let raw = json!({
            "number": 12,
            "state": "closed",
            "state_reason": "not_planned",
            "user": {"login": "alice", "id": 5}
        });
        let details = SubjectDetails::from_raw(&raw);
        assert_eq!(details.number, Some(12));
        assert_eq!(details.state.as_deref(), Some("closed"));
        assert_eq!(details.state_reason.as_deref(), Some("not_planned"));
        assert_eq!(details.merged, None);
        assert_eq!(details.author_login.as_deref(), Some("alice"));
        assert_eq!(details.author_id, Some(5));
    }

    #[test]
    fn test_sender_fallback_and_empty_strings() {
        let raw = json!({"state": "", "sender": {"login": "bot"}});
        let details = SubjectDetails::from_raw(&raw);
        assert_eq!(details.state, None);
        assert_eq!(details.author_login.as_deref(), Some("bot"));
    }

    #[test]
    fn test_pull_request_details() {
        let raw = json!({
            "id": 99,
            "number": 7,
            "title": "Add retries",
            "state": "open",
            "draft": true,
            "merged": false,
            "user": {"login": "carol"},
            "created_at": "2025-01-01T00:00:00Z"
        });
        let pr = PullRequestDetails::from_raw(&raw).unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.github_id, Some(99));
        assert_eq!(pr.draft, Some(true));
        assert_eq!(pr.author_login.as_deref(), Some("carol"));
        assert!(pr.created_at.is_some());
        assert!(pr.merged_at.is_none());
    }

    #[test]
    fn test_pull_request_requires_number() {
        assert!(PullRequestDetails::from_raw(&json!({"title": "x"})).is_none());
        assert!(PullRequestDetails::from_raw(&json!("string")).is_none());
    }
}
