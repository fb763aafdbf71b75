use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use common::config::ConnectorConfig;
use normalizer::models::RepoAffiliation;
use normalizer::payloads::{
    CommentEventPayload, PullRequestEventPayload, RepoEventPayload, RepoPayload,
};
use normalizer::{convert_comment, convert_pull_request, convert_repo, ConvertContext};
use serde::de::DeserializeOwned;
use store::{Pipe, StateStore};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ApiEnv, BitbucketApi};
use crate::emitter::DirectSink;
use crate::fetcher::commits::resolve_first_sha;
use crate::fetcher::sync_reviews;
use crate::metrics::WEBHOOK_EVENTS_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEvent {
    RepoUpdated,
    PullRequestCreated,
    PullRequestUpdated,
    PullRequestApproved,
    PullRequestUnapproved,
    PullRequestFulfilled,
    PullRequestRejected,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 10] = [
        WebhookEvent::RepoUpdated,
        WebhookEvent::PullRequestCreated,
        WebhookEvent::PullRequestUpdated,
        WebhookEvent::PullRequestApproved,
        WebhookEvent::PullRequestUnapproved,
        WebhookEvent::PullRequestFulfilled,
        WebhookEvent::PullRequestRejected,
        WebhookEvent::CommentCreated,
        WebhookEvent::CommentUpdated,
        WebhookEvent::CommentDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::RepoUpdated => "repo:updated",
            WebhookEvent::PullRequestCreated => "pullrequest:created",
            WebhookEvent::PullRequestUpdated => "pullrequest:updated",
            WebhookEvent::PullRequestApproved => "pullrequest:approved",
            WebhookEvent::PullRequestUnapproved => "pullrequest:unapproved",
            WebhookEvent::PullRequestFulfilled => "pullrequest:fulfilled",
            WebhookEvent::PullRequestRejected => "pullrequest:rejected",
            WebhookEvent::CommentCreated => "pullrequest:comment_created",
            WebhookEvent::CommentUpdated => "pullrequest:comment_updated",
            WebhookEvent::CommentDeleted => "pullrequest:comment_deleted",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery problems attributable to the caller.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing `event` from query")]
    MissingEvent,
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: WebhookEvent,
        #[source]
        source: serde_json::Error,
    },
}

impl WebhookError {
    /// True when `err` was caused by the delivery itself rather than by the
    /// connector or Bitbucket.
    pub fn is_rejection(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| cause.downcast_ref::<WebhookError>().is_some())
    }
}

/// Event name carried in the `event` parameter of the delivery URL query.
pub fn event_name(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == "event")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub struct WebhookDispatcher {
    api: Arc<dyn BitbucketApi>,
    state: Arc<dyn StateStore>,
    pipe: Arc<dyn Pipe>,
    ctx: ConvertContext,
    concurrency: usize,
    third_party: Vec<String>,
}

impl WebhookDispatcher {
    pub fn new(
        config: &ConnectorConfig,
        api: Arc<dyn BitbucketApi>,
        state: Arc<dyn StateStore>,
        pipe: Arc<dyn Pipe>,
    ) -> Self {
        Self {
            api,
            state,
            pipe,
            ctx: ConvertContext::from(config),
            concurrency: config.concurrency,
            third_party: config.accounts.clone(),
        }
    }

    /// Handles one delivery and returns the number of records written.
    pub async fn dispatch(&self, query: &str, body: &[u8]) -> Result<usize> {
        let name = event_name(query).ok_or(WebhookError::MissingEvent)?;
        let Some(event) = WebhookEvent::parse(&name) else {
            WEBHOOK_EVENTS_TOTAL
                .with_label_values(&["unknown", "ignored"])
                .inc();
            debug!(event = %name, "ignoring unsupported webhook event");
            return Ok(0);
        };

        let sink = Arc::new(DirectSink::new(Arc::clone(&self.pipe)));
        let env = ApiEnv {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
            ctx: self.ctx.clone(),
            sink: sink.clone(),
            concurrency: self.concurrency,
        };

        let result = self.handle(&env, event, body).await;
        let result = match result {
            Ok(()) => self
                .pipe
                .flush()
                .await
                .context("flushing webhook records")
                .map(|_| sink.written()),
            Err(err) => Err(err),
        };
        match &result {
            Ok(count) => {
                WEBHOOK_EVENTS_TOTAL
                    .with_label_values(&[event.as_str(), "processed"])
                    .inc();
                info!(event = %event, count, "webhook processed");
            }
            Err(err) => {
                WEBHOOK_EVENTS_TOTAL
                    .with_label_values(&[event.as_str(), "error"])
                    .inc();
                warn!(event = %event, error = ?err, "webhook failed");
            }
        }
        result
    }

    async fn handle(&self, env: &ApiEnv, event: WebhookEvent, body: &[u8]) -> Result<()> {
        match event {
            WebhookEvent::RepoUpdated => {
                let payload: RepoEventPayload = parse(event, body)?;
                let affiliation = self.affiliation(&payload.repository);
                env.sink
                    .emit(convert_repo(&env.ctx, &payload.repository, affiliation).into())
                    .await
            }
            WebhookEvent::PullRequestCreated
            | WebhookEvent::PullRequestUpdated
            | WebhookEvent::PullRequestApproved
            | WebhookEvent::PullRequestUnapproved
            | WebhookEvent::PullRequestFulfilled
            | WebhookEvent::PullRequestRejected => {
                let payload: PullRequestEventPayload = parse(event, body)?;
                let repo = &payload.repository;
                let pr = &payload.pullrequest;
                let shas: Vec<String> = resolve_first_sha(env, &repo.full_name, &repo.uuid, pr.id)
                    .await?
                    .into_iter()
                    .collect();
                env.sink
                    .emit(convert_pull_request(&env.ctx, pr, &repo.uuid, &shas).into())
                    .await?;
                sync_reviews(env, &repo.uuid, pr)
                    .await
                    .context("error getting reviews")?;
                Ok(())
            }
            WebhookEvent::CommentCreated
            | WebhookEvent::CommentUpdated
            | WebhookEvent::CommentDeleted => {
                let payload: CommentEventPayload = parse(event, body)?;
                let mut comment = convert_comment(
                    &env.ctx,
                    &payload.comment,
                    &payload.repository.uuid,
                    &payload.pullrequest.id.to_string(),
                );
                if event == WebhookEvent::CommentDeleted {
                    comment.active = false;
                }
                env.sink.emit(comment.into()).await
            }
        }
    }

    fn affiliation(&self, repo: &RepoPayload) -> RepoAffiliation {
        let workspace = repo.workspace_slug();
        if self.third_party.iter().any(|account| account == workspace) {
            RepoAffiliation::ThirdParty
        } else {
            RepoAffiliation::Organization
        }
    }
}

fn parse<T: DeserializeOwned>(event: WebhookEvent, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|source| WebhookError::InvalidPayload { event, source }.into())
}
