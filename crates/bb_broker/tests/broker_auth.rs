use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bb_broker::error::status_of;
use bb_broker::{
    BitbucketBroker, BitbucketBrokerBuilder, Credentials, HttpExec, RefreshPolicy, TokenRefresher,
};
use http::{header, Request, Response, StatusCode};

/// Replies with the scripted statuses in order, then 200 forever.
struct ScriptedExec {
    statuses: Mutex<Vec<u16>>,
    seen_auth: Mutex<Vec<String>>,
}

impl ScriptedExec {
    fn new(statuses: &[u16]) -> Arc<Self> {
        let mut statuses = statuses.to_vec();
        statuses.reverse();
        Arc::new(Self {
            statuses: Mutex::new(statuses),
            seen_auth: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen_auth.lock().unwrap().len()
    }

    fn auth_headers(&self) -> Vec<String> {
        self.seen_auth.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExec for ScriptedExec {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let auth = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.seen_auth.lock().unwrap().push(auth);
        let status = self.statuses.lock().unwrap().pop().unwrap_or(200);
        Ok(Response::builder()
            .status(status)
            .body(br#"{"ok":true}"#.to_vec())?)
    }
}

struct CountingRefresher {
    calls: AtomicUsize,
}

impl CountingRefresher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("fresh-{n}"))
    }
}

fn get(path: &str) -> Request<Vec<u8>> {
    Request::builder()
        .method("GET")
        .uri(format!("https://api.bitbucket.org/2.0{path}"))
        .body(Vec::new())
        .unwrap()
}

fn broker_with(
    exec: Arc<ScriptedExec>,
    credentials: Credentials,
    refresher: Arc<CountingRefresher>,
    policy: Arc<RefreshPolicy>,
) -> Arc<dyn BitbucketBroker> {
    BitbucketBrokerBuilder::new(credentials)
        .http_exec(exec)
        .refresher(refresher)
        .refresh_policy(policy)
        .backoff(Duration::ZERO, Duration::ZERO, 0.0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn unauthorized_refreshes_once_and_retries() {
    let exec = ScriptedExec::new(&[401]);
    let refresher = CountingRefresher::new();
    let broker = broker_with(
        exec.clone(),
        Credentials::oauth2("stale", "refresh"),
        refresher.clone(),
        Arc::new(RefreshPolicy::new(Duration::from_secs(60))),
    );

    let response = broker.send(get("/user")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        exec.auth_headers(),
        vec!["Bearer stale".to_string(), "Bearer fresh-1".to_string()]
    );
}

#[tokio::test]
async fn second_unauthorized_in_cooldown_is_fatal() {
    let exec = ScriptedExec::new(&[401, 401]);
    let refresher = CountingRefresher::new();
    let broker = broker_with(
        exec.clone(),
        Credentials::oauth2("stale", "refresh"),
        refresher.clone(),
        Arc::new(RefreshPolicy::new(Duration::from_secs(60))),
    );

    let err = broker.send(get("/user")).await.unwrap_err();
    assert_eq!(status_of(&err), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(exec.calls(), 2);
}

#[tokio::test]
async fn cooldown_is_shared_across_requests() {
    let exec = ScriptedExec::new(&[401, 200, 401]);
    let refresher = CountingRefresher::new();
    let broker = broker_with(
        exec.clone(),
        Credentials::oauth2("stale", "refresh"),
        refresher.clone(),
        Arc::new(RefreshPolicy::new(Duration::from_secs(60))),
    );

    broker.send(get("/user")).await.unwrap();
    let err = broker.send(get("/workspaces")).await.unwrap_err();
    assert_eq!(status_of(&err), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn basic_credentials_never_refresh() {
    let exec = ScriptedExec::new(&[401]);
    let refresher = CountingRefresher::new();
    let broker = broker_with(
        exec.clone(),
        Credentials::basic("user", "pass"),
        refresher.clone(),
        Arc::new(RefreshPolicy::default()),
    );

    let err = broker.send(get("/user")).await.unwrap_err();
    assert_eq!(status_of(&err), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(exec.auth_headers(), vec!["Basic dXNlcjpwYXNz".to_string()]);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let exec = ScriptedExec::new(&[503, 429]);
    let broker = broker_with(
        exec.clone(),
        Credentials::basic("user", "pass"),
        CountingRefresher::new(),
        Arc::new(RefreshPolicy::default()),
    );

    let response = broker.send(get("/workspaces")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(exec.calls(), 3);
}

#[tokio::test]
async fn client_errors_carry_endpoint() {
    let exec = ScriptedExec::new(&[404]);
    let broker = broker_with(
        exec.clone(),
        Credentials::basic("user", "pass"),
        CountingRefresher::new(),
        Arc::new(RefreshPolicy::default()),
    );

    let err = broker
        .send(get("/repositories/acme/widgets/pullrequests/1/commits"))
        .await
        .unwrap_err();
    let http = err
        .downcast_ref::<bb_broker::HttpStatusError>()
        .expect("typed status error");
    assert_eq!(http.status, StatusCode::NOT_FOUND);
    assert_eq!(
        http.endpoint,
        "/2.0/repositories/acme/widgets/pullrequests/1/commits"
    );
    assert_eq!(exec.calls(), 1);
}
