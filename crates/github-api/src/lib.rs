//! Client for the GitHub notifications API.
//!
//! Fetches notification threads page by page, shrinking the page size when the
//! upstream gateway times out, and classifies failures as retriable or not so
//! callers can decide whether a whole job should be retried later.

pub mod client;
pub mod error;
pub mod paging;
pub mod retriable;
pub mod subject;
pub mod types;

pub use client::{ClientConfig, GITHUB_API_BASE, GithubClient, NotificationsApi};
pub use error::{GithubError, Result};
pub use paging::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE, PAGE_SIZE_LADDER, PageStep, degrade_page_size};
pub use retriable::{is_retriable_error, is_retriable_status};
pub use subject::{PullRequestDetails, SubjectDetails};
pub use types::{NotificationThread, RepositorySnapshot, SimpleUser, Subject};
