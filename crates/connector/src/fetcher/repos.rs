use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use normalizer::payloads::RepoPayload;
use tracing::debug;

use crate::client::BitbucketApi;
use crate::fetcher::updated_since;
use crate::metrics::observe_fetch;
use crate::paginator::{fetch_count, Paginator};

fn endpoint(workspace: &str) -> String {
    format!("repositories/{workspace}")
}

/// Pages of repositories in `workspace` updated after `cutoff`, newest first.
pub fn repos_paginator(
    api: &Arc<dyn BitbucketApi>,
    workspace: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Paginator {
    Paginator::new(Arc::clone(api), endpoint(workspace), updated_since(cutoff))
}

pub async fn fetch_repos(
    api: &Arc<dyn BitbucketApi>,
    workspace: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<RepoPayload>> {
    debug!(workspace, since = ?cutoff, "fetching repos");
    let start = Instant::now();
    let result = repos_paginator(api, workspace, cutoff)
        .collect_all::<RepoPayload>()
        .await
        .with_context(|| format!("fetching repos for {workspace}"));
    observe_fetch("repos", start, &result);
    result
}

pub async fn fetch_repo_count(api: &dyn BitbucketApi, workspace: &str) -> Result<i64> {
    fetch_count(api, &endpoint(workspace), Vec::new())
        .await
        .with_context(|| format!("counting repos for {workspace}"))
}
