use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use github_api::{ClientConfig, GithubClient, GithubError, NotificationsApi};
use serde_json::{Value, json};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct MockGithub {
    threads: Vec<Value>,
    /// (per_page, page) -> status to answer with once.
    failures: Mutex<HashMap<(usize, usize), u16>>,
    /// Answer every notifications request with this status.
    always_fail: Option<u16>,
    empty_body: bool,
    requests: Mutex<Vec<HashMap<String, String>>>,
}

impl MockGithub {
    fn with_threads(count: usize) -> Self {
        Self {
            threads: (0..count).map(thread_json).collect(),
            ..Default::default()
        }
    }

    fn fail_once(self, per_page: usize, page: usize, status: u16) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((per_page, page), status);
        self
    }

    fn pages_requested(&self) -> Vec<(usize, usize)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|q| (q["per_page"].parse().unwrap(), q["page"].parse().unwrap()))
            .collect()
    }
}

fn thread_json(i: usize) -> Value {
    json!({
        "id": format!("{}", i + 1),
        "repository": {
            "id": 1,
            "name": "hello",
            "full_name": "octo/hello",
            "owner": {"login": "octo", "id": 1}
        },
        "subject": {
            "title": format!("Issue {}", i + 1),
            "url": format!("https://api.github.com/repos/octo/hello/issues/{}", i + 1),
            "type": "Issue"
        },
        "reason": "subscribed",
        "unread": true,
        "updated_at": "2025-02-01T00:00:00Z"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn notifications(
    State(state): State<Arc<MockGithub>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.requests.lock().unwrap().push(query.clone());

    let per_page: usize = query["per_page"].parse().unwrap();
    let page: usize = query["page"].parse().unwrap();

    if let Some(status) = state.always_fail {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    if let Some(status) = state.failures.lock().unwrap().remove(&(per_page, page)) {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    if state.empty_body {
        return (StatusCode::OK, "").into_response();
    }

    let start = (page - 1) * per_page;
    let items: Vec<Value> = state
        .threads
        .iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();
    Json(items).into_response()
}

async fn user(headers: HeaderMap) -> Response {
    if authorized(&headers) {
        Json(json!({"login": "octo"})).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "Bad credentials").into_response()
    }
}

async fn issue() -> Json<Value> {
    Json(json!({"number": 3, "state": "open", "user": {"login": "alice"}}))
}

async fn spawn_server(state: Arc<MockGithub>) -> String {
    let app = Router::new()
        .route("/notifications", get(notifications))
        .route("/user", get(user))
        .route("/repos/octo/hello/issues/3", get(issue))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client_for(state: Arc<MockGithub>, per_page: usize) -> GithubClient {
    let base = spawn_server(state).await;
    let config = ClientConfig::default()
        .with_base_url(base)
        .with_per_page(per_page);
    GithubClient::with_token(config, TOKEN).await.unwrap()
}

fn ids(threads: &[github_api::NotificationThread]) -> Vec<usize> {
    threads.iter().map(|t| t.id.parse().unwrap()).collect()
}

#[tokio::test]
async fn test_paginates_until_short_page() {
    let state = Arc::new(MockGithub::with_threads(5));
    let client = client_for(state.clone(), 2).await;

    let threads = client.fetch_notifications(None, None, false).await.unwrap();

    assert_eq!(ids(&threads), vec![1, 2, 3, 4, 5]);
    assert_eq!(state.pages_requested(), vec![(2, 1), (2, 2), (2, 3)]);
}

#[tokio::test]
async fn test_gateway_error_resumes_at_same_offset_with_smaller_pages() {
    let state = Arc::new(MockGithub::with_threads(120).fail_once(50, 2, 502));
    let client = client_for(state.clone(), 50).await;

    let threads = client.fetch_notifications(None, None, false).await.unwrap();

    assert_eq!(ids(&threads), (1..=120).collect::<Vec<_>>());
    let pages = state.pages_requested();
    assert_eq!(pages[0], (50, 1));
    assert_eq!(pages[1], (50, 2));
    // Item 51 is the first item of page 3 at 25 per page.
    assert_eq!(pages[2], (25, 3));
    assert!(pages[2..].iter().all(|(size, _)| *size == 25));
}

#[tokio::test]
async fn test_gateway_error_with_partial_page_skips_collected_items() {
    // 75 items collected at 25, then 504: resume on page 8 at 10 per page and
    // drop the 5 rows already seen.
    let state = Arc::new(MockGithub::with_threads(90).fail_once(25, 4, 504));
    let client = client_for(state.clone(), 25).await;

    let threads = client.fetch_notifications(None, None, false).await.unwrap();

    assert_eq!(ids(&threads), (1..=90).collect::<Vec<_>>());
    assert!(state.pages_requested().contains(&(10, 8)));
}

#[tokio::test]
async fn test_gateway_errors_stop_at_floor() {
    let state = Arc::new(MockGithub {
        always_fail: Some(504),
        ..MockGithub::with_threads(10)
    });
    let client = client_for(state.clone(), 50).await;

    let err = client
        .fetch_notifications(None, None, false)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(504));
    let sizes: Vec<usize> = state.pages_requested().iter().map(|(s, _)| *s).collect();
    assert_eq!(sizes, vec![50, 25, 10, 5]);
}

#[tokio::test]
async fn test_non_gateway_error_aborts_immediately() {
    let state = Arc::new(MockGithub::with_threads(10).fail_once(5, 2, 404));
    let client = client_for(state.clone(), 5).await;

    let err = client
        .fetch_notifications(None, None, false)
        .await
        .unwrap_err();

    assert!(matches!(err, GithubError::Status { status: 404, .. }));
    assert_eq!(state.pages_requested(), vec![(5, 1), (5, 2)]);
}

#[tokio::test]
async fn test_query_parameters() {
    let state = Arc::new(MockGithub::with_threads(1));
    let client = client_for(state.clone(), 50).await;
    let since = "2025-01-01T00:00:00Z".parse().unwrap();

    client
        .fetch_notifications(Some(since), None, true)
        .await
        .unwrap();

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests[0]["all"], "false");
    assert_eq!(requests[0]["since"], "2025-01-01T00:00:00Z");
    assert!(!requests[0].contains_key("before"));
}

#[tokio::test]
async fn test_empty_body_is_empty_page() {
    let state = Arc::new(MockGithub {
        empty_body: true,
        ..Default::default()
    });
    let client = client_for(state, 50).await;

    let threads = client.fetch_notifications(None, None, false).await.unwrap();
    assert!(threads.is_empty());
}

#[tokio::test]
async fn test_token_validation() {
    let base = spawn_server(Arc::new(MockGithub::default())).await;
    let config = ClientConfig::default().with_base_url(base);

    let err = GithubClient::with_token(config.clone(), "   ")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GithubError::EmptyToken));

    let err = GithubClient::with_token(config.clone(), "wrong")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GithubError::TokenValidation(_)));
    assert_eq!(err.status(), Some(401));

    assert!(GithubClient::with_token(config, TOKEN).await.is_ok());
}

#[tokio::test]
async fn test_requests_without_token_fail() {
    let base = spawn_server(Arc::new(MockGithub::default())).await;
    let client = GithubClient::new(ClientConfig::default().with_base_url(base)).unwrap();

    let err = client
        .fetch_notifications(None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, GithubError::MissingToken));
}

#[tokio::test]
async fn test_fetch_subject_raw() {
    let state = Arc::new(MockGithub::default());
    let base = spawn_server(state.clone()).await;
    let config = ClientConfig::default().with_base_url(base.clone());
    let client = GithubClient::with_token(config, TOKEN).await.unwrap();

    assert!(client.fetch_subject_raw("").await.unwrap().is_none());

    let raw = client
        .fetch_subject_raw(&format!("{base}/repos/octo/hello/issues/3"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw["number"], 3);
}
