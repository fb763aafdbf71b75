use std::collections::BTreeSet;

use anyhow::{Context, Result};
use normalizer::payloads::PullRequestPayload;
use normalizer::{deactivate_review_request, extract_reviews};
use store::{get_json, set_json};
use tracing::debug;

use crate::client::ApiEnv;
use crate::fetcher::review_requests_key;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewSync {
    pub reviews: usize,
    pub requests: usize,
    pub deactivated: usize,
}

/// Emits reviews and outstanding review requests for `pr`, then deactivates
/// requests remembered from an earlier pass that are no longer outstanding.
pub async fn sync_reviews(
    env: &ApiEnv,
    repo_ref: &str,
    pr: &PullRequestPayload,
) -> Result<ReviewSync> {
    let extraction = extract_reviews(&env.ctx, pr, repo_ref);
    let pr_id = env.ctx.pull_request_id(&pr.id.to_string(), repo_ref);
    let key = review_requests_key(&pr_id);
    let current: BTreeSet<String> = extraction.request_ids().into_iter().collect();

    let mut sync = ReviewSync {
        reviews: extraction.reviews.len(),
        requests: extraction.requests.len(),
        deactivated: 0,
    };
    for review in extraction.reviews {
        env.sink.emit(review.into()).await?;
    }
    for request in extraction.requests {
        env.sink.emit(request.into()).await?;
    }

    let previous: Vec<String> = get_json(env.state.as_ref(), &key)
        .await
        .with_context(|| format!("reading {key}"))?
        .unwrap_or_default();
    for stale in previous.iter().filter(|id| !current.contains(*id)) {
        env.sink
            .emit(deactivate_review_request(&env.ctx, stale).into())
            .await?;
        sync.deactivated += 1;
    }

    if !current.is_empty() {
        let ids: Vec<&String> = current.iter().collect();
        set_json(env.state.as_ref(), &key, &ids)
            .await
            .with_context(|| format!("writing {key}"))?;
    }
    debug!(pr = pr.id, reviews = sync.reviews, requests = sync.requests, deactivated = sync.deactivated, "synced reviews");
    Ok(sync)
}
