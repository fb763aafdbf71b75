use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::BrokerConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderValue, Request, Response};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::exponential_jitter_backoff;
use crate::credentials::{Credentials, RefreshPolicy, TokenRefresher};
use crate::error::HttpStatusError;
use crate::metrics;
use crate::model::{parse_retry_after, status_class, StatusDisposition};

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let mut builder = self.client.request(parts.method, parts.uri.to_string());
        builder = builder.headers(parts.headers);
        let resp = builder.body(body).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::builder().status(status).body(bytes.to_vec())?;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Authenticated request/response capability used by the Bitbucket client.
pub trait BitbucketBroker: Send + Sync {
    fn send(
        &self,
        request: Request<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Response<Vec<u8>>>>;
}

pub struct BitbucketBrokerBuilder {
    credentials: Credentials,
    refresher: Option<Arc<dyn TokenRefresher>>,
    policy: Arc<RefreshPolicy>,
    http_exec: Option<Arc<dyn HttpExec>>,
    user_agent: String,
    max_inflight: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    jitter_frac: f32,
}

impl BitbucketBrokerBuilder {
    pub fn new(credentials: Credentials) -> Self {
        let defaults = BrokerConfig::default();
        Self::new_with_config(credentials, &defaults)
    }

    pub fn new_with_config(credentials: Credentials, config: &BrokerConfig) -> Self {
        Self {
            credentials,
            refresher: None,
            policy: Arc::new(RefreshPolicy::new(Duration::from_secs(
                config.refresh_cooldown_secs,
            ))),
            http_exec: None,
            user_agent: "bitbucket-connector".to_string(),
            max_inflight: config.max_inflight.max(1),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            jitter_frac: config.jitter_frac,
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn refresh_policy(mut self, policy: Arc<RefreshPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = max.max(1);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration, jitter: f32) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self.jitter_frac = jitter;
        self
    }

    pub fn build(self) -> Result<Arc<dyn BitbucketBroker>> {
        let exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(&self.user_agent)?),
        };

        let inner = Arc::new(Inner {
            http_exec: exec,
            credentials: self.credentials,
            refresher: self.refresher,
            policy: self.policy,
            inflight: Arc::new(Semaphore::new(self.max_inflight)),
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
            jitter: self.jitter_frac,
        });

        Ok(Arc::new(LocalBitbucketBroker { inner }))
    }
}

struct Inner {
    http_exec: Arc<dyn HttpExec>,
    credentials: Credentials,
    refresher: Option<Arc<dyn TokenRefresher>>,
    policy: Arc<RefreshPolicy>,
    inflight: Arc<Semaphore>,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    jitter: f32,
}

impl Inner {
    async fn execute_once(
        &self,
        mut request: Request<Vec<u8>>,
        authorization: &str,
    ) -> Result<Response<Vec<u8>>> {
        let _permit = self.inflight.clone().acquire_owned().await?;
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_str(authorization)?);

        metrics::INFLIGHT.inc();
        let start = Instant::now();
        let response = self.http_exec.execute(request).await;
        metrics::INFLIGHT.dec();
        metrics::LATENCY.observe(start.elapsed().as_secs_f64());
        response
    }

    /// Attempts a credential refresh. `Ok(false)` means no refresh was
    /// possible: basic credentials, no refresher, or the cool-down is active.
    async fn try_refresh(&self) -> Result<bool> {
        let Some(refresher) = &self.refresher else {
            return Ok(false);
        };
        if !self.credentials.is_refreshable() {
            return Ok(false);
        }
        if !self.policy.try_acquire(Instant::now()) {
            metrics::REFRESHES_TOTAL
                .with_label_values(&["throttled"])
                .inc();
            warn!(
                cooldown_secs = self.policy.cooldown().as_secs(),
                "credential refresh skipped, cool-down still active"
            );
            return Ok(false);
        }
        match self.credentials.refresh(refresher.as_ref()).await {
            Ok(()) => {
                metrics::REFRESHES_TOTAL.with_label_values(&["ok"]).inc();
                debug!("oauth2 access token refreshed");
                Ok(true)
            }
            Err(err) => {
                metrics::REFRESHES_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                Err(err.context("refreshing oauth2 access token"))
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        exponential_jitter_backoff(
            self.backoff_base,
            attempt.saturating_sub(1),
            self.backoff_max,
            self.jitter,
        )
    }
}

#[derive(Clone)]
pub struct LocalBitbucketBroker {
    inner: Arc<Inner>,
}

impl BitbucketBroker for LocalBitbucketBroker {
    fn send(
        &self,
        request: Request<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Response<Vec<u8>>>> {
        let inner = self.inner.clone();
        async move { send_with_retries(inner, request).await }.boxed()
    }
}

async fn send_with_retries(
    inner: Arc<Inner>,
    request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>> {
    let endpoint = request.uri().path().to_string();
    let method = request.method().as_str().to_string();
    let mut attempt = 0u32;
    let mut reauthorized = false;

    loop {
        attempt += 1;
        let authorization = inner.credentials.authorization().await;
        let response = match inner
            .execute_once(clone_request(&request)?, &authorization)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if attempt >= inner.max_attempts {
                    return Err(err.context(format!("{method} {endpoint}")));
                }
                let wait = inner.backoff(attempt);
                warn!(
                    attempt,
                    endpoint = %endpoint,
                    error = %err,
                    "Bitbucket request attempt failed"
                );
                metrics::RETRIES_TOTAL
                    .with_label_values(&["transport"])
                    .inc();
                sleep(wait).await;
                continue;
            }
        };

        let status = response.status();
        metrics::REQUESTS_TOTAL
            .with_label_values(&[&method, status_class(status)])
            .inc();

        match StatusDisposition::classify(status) {
            StatusDisposition::Success => return Ok(response),
            StatusDisposition::Unauthorized => {
                if !reauthorized {
                    // Another request may already have refreshed the token.
                    let current = inner.credentials.authorization().await;
                    if current != authorization || inner.try_refresh().await? {
                        reauthorized = true;
                        continue;
                    }
                }
                metrics::UNAUTHORIZED_TOTAL.inc();
                warn!(endpoint = %endpoint, "Bitbucket rejected credentials");
                return Err(HttpStatusError::with_endpoint(status, endpoint).into());
            }
            StatusDisposition::Retryable(reason) => {
                if attempt >= inner.max_attempts {
                    warn!(
                        status = %status,
                        endpoint = %endpoint,
                        attempts = attempt,
                        "Bitbucket request exhausted retries"
                    );
                    return Err(HttpStatusError::with_endpoint(status, endpoint).into());
                }
                let (wait, reason) = match parse_retry_after(response.headers()) {
                    Some(advice) => (advice.wait, advice.reason),
                    None => (inner.backoff(attempt), reason),
                };
                warn!(
                    status = %status,
                    endpoint = %endpoint,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Bitbucket responded with retryable status"
                );
                metrics::RETRIES_TOTAL.with_label_values(&[reason]).inc();
                sleep(wait).await;
            }
            StatusDisposition::Fatal => {
                debug!(
                    status = %status,
                    endpoint = %endpoint,
                    body_preview = %body_preview(response.body()),
                    "Bitbucket returned error response"
                );
                return Err(HttpStatusError::with_endpoint(status, endpoint).into());
            }
        }
    }
}

fn clone_request(request: &Request<Vec<u8>>) -> Result<Request<Vec<u8>>> {
    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(request.version());
    if let Some(headers) = builder.headers_mut() {
        headers.extend(
            request
                .headers()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
    }
    Ok(builder.body(request.body().clone())?)
}

fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let text = String::from_utf8_lossy(body);
    let mut truncated: String = text.chars().take(256).collect();
    if truncated.len() < text.len() {
        truncated.push('…');
    }
    truncated
}
