use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use normalizer::convert_pull_request;
use normalizer::payloads::PullRequestPayload;
use tracing::debug;

use crate::async_pool::AsyncPool;
use crate::client::ApiEnv;
use crate::fetcher::{fetch_comments, fetch_commits, sync_reviews, updated_since};
use crate::metrics::observe_fetch;
use crate::paginator::Paginator;

const PULL_REQUEST_STATES: [&str; 3] = ["MERGED", "SUPERSEDED", "OPEN"];

fn listing_params(cutoff: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = PULL_REQUEST_STATES
        .iter()
        .map(|state| ("state".to_string(), state.to_string()))
        .collect();
    params.push(("pagelen".to_string(), "50".to_string()));
    params.extend(updated_since(cutoff));
    params
}

/// Exports every pull request of a repository. Each page runs its comments,
/// reviews and commits fetches through a fresh pool and is finished before
/// the next page is requested.
pub async fn fetch_pull_requests(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<usize> {
    debug!(repo = repo_full_name, since = ?cutoff, "fetching pull requests");
    let start = Instant::now();
    let result = export_pages(env, repo_full_name, repo_ref, cutoff)
        .await
        .with_context(|| format!("fetching pull requests for {repo_full_name}"));
    observe_fetch("pull_requests", start, &result);
    if let Ok(count) = &result {
        debug!(repo = repo_full_name, count, "finished fetching pull requests");
    }
    result
}

async fn export_pages(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<usize> {
    let mut pager = Paginator::new(
        Arc::clone(&env.api),
        format!("repositories/{repo_full_name}/pullrequests"),
        listing_params(cutoff),
    );
    let mut count = 0;
    while let Some(page) = pager.next_page::<PullRequestPayload>().await? {
        count += page.len();
        export_page(env, repo_full_name, repo_ref, cutoff, page).await?;
    }
    Ok(count)
}

async fn export_page(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    cutoff: Option<DateTime<Utc>>,
    page: Vec<PullRequestPayload>,
) -> Result<()> {
    let pool = AsyncPool::new(env.concurrency);
    let repo_full_name: Arc<str> = Arc::from(repo_full_name);
    let repo_ref: Arc<str> = Arc::from(repo_ref);

    for pr in page {
        let pr = Arc::new(pr);

        {
            let env = env.clone();
            let name = Arc::clone(&repo_full_name);
            let repo_ref = Arc::clone(&repo_ref);
            let pr = Arc::clone(&pr);
            pool.submit(async move {
                fetch_comments(&env, &name, &repo_ref, pr.id, cutoff).await?;
                Ok(())
            });
        }
        {
            let env = env.clone();
            let repo_ref = Arc::clone(&repo_ref);
            let pr = Arc::clone(&pr);
            pool.submit(async move {
                sync_reviews(&env, &repo_ref, &pr).await?;
                Ok(())
            });
        }
        {
            let env = env.clone();
            let name = Arc::clone(&repo_full_name);
            let repo_ref = Arc::clone(&repo_ref);
            pool.submit(async move {
                let shas = fetch_commits(&env, &name, &repo_ref, pr.id, cutoff).await?;
                emit_pull_request(&env, &repo_ref, &pr, &shas, cutoff).await
            });
        }
    }
    pool.wait().await
}

async fn emit_pull_request(
    env: &ApiEnv,
    repo_ref: &str,
    pr: &PullRequestPayload,
    shas: &[String],
    cutoff: Option<DateTime<Utc>>,
) -> Result<()> {
    if let Some(cutoff) = cutoff {
        if pr.updated_on < cutoff {
            debug!(
                pr = pr.id,
                updated_on = %pr.updated_on,
                "pull request not updated since last sync, skipping"
            );
            return Ok(());
        }
    }
    env.sink
        .emit(convert_pull_request(&env.ctx, pr, repo_ref, shas).into())
        .await
}
