use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use normalizer::convert_commit;
use normalizer::payloads::CommitPayload;
use tracing::debug;

use crate::client::{is_not_found, ApiEnv, BitbucketApi};
use crate::fetcher::{first_sha_key, updated_since};
use crate::metrics::{observe_fetch, ABSENCE_SKIPS_TOTAL};
use crate::paginator::Paginator;

fn endpoint(repo_full_name: &str, pr_number: i64) -> String {
    format!("repositories/{repo_full_name}/pullrequests/{pr_number}/commits")
}

/// Emits a commit record per pull request commit and returns the shas oldest
/// first. A pull request whose commits are gone (404) has no shas.
pub async fn fetch_commits(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    pr_number: i64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<String>> {
    let start = Instant::now();
    let result = emit_commits(env, repo_full_name, repo_ref, pr_number, cutoff).await;
    observe_fetch("commits", start, &result);
    let shas = match result {
        Ok(shas) => shas,
        Err(err) if is_not_found(&err) => {
            ABSENCE_SKIPS_TOTAL.with_label_values(&["commits"]).inc();
            debug!(repo = repo_full_name, pr = pr_number, "pull request commits not found, treating as empty");
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err.context(format!(
                "fetching commits for {repo_full_name}#{pr_number}"
            )))
        }
    };

    if let Some(first) = shas.first() {
        let key = first_sha_key(repo_ref, &pr_number.to_string());
        if !env.state.exists(&key).await? {
            env.state.set(&key, first.clone()).await?;
        }
    }
    debug!(repo = repo_full_name, pr = pr_number, count = shas.len(), "finished fetching commits");
    Ok(shas)
}

async fn emit_commits(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    pr_number: i64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<String>> {
    let pr_ref = pr_number.to_string();
    let mut pager = Paginator::new(
        Arc::clone(&env.api),
        endpoint(repo_full_name, pr_number),
        updated_since(cutoff),
    );
    let mut shas = Vec::new();
    while let Some(commits) = pager.next_page::<CommitPayload>().await? {
        for commit in &commits {
            env.sink
                .emit(convert_commit(&env.ctx, commit, repo_ref, &pr_ref).into())
                .await?;
            shas.push(commit.hash.clone());
        }
    }
    // The API lists newest first.
    shas.reverse();
    Ok(shas)
}

/// Oldest commit of a single pull request, without incremental filtering.
pub async fn fetch_first_commit_sha(
    api: &Arc<dyn BitbucketApi>,
    repo_full_name: &str,
    pr_number: i64,
) -> Result<Option<String>> {
    let result = Paginator::new(Arc::clone(api), endpoint(repo_full_name, pr_number), Vec::new())
        .collect_all::<CommitPayload>()
        .await;
    match result {
        Ok(commits) => Ok(commits.last().map(|commit| commit.hash.clone())),
        Err(err) if is_not_found(&err) => {
            ABSENCE_SKIPS_TOTAL.with_label_values(&["commits"]).inc();
            debug!(repo = repo_full_name, pr = pr_number, "pull request commits not found");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| {
            format!("fetching first commit for {repo_full_name}#{pr_number}")
        }),
    }
}

/// First sha from state, fetched and cached when absent.
pub async fn resolve_first_sha(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    pr_number: i64,
) -> Result<Option<String>> {
    let key = first_sha_key(repo_ref, &pr_number.to_string());
    if let Some(sha) = env.state.get(&key).await? {
        return Ok(Some(sha));
    }
    let sha = fetch_first_commit_sha(&env.api, repo_full_name, pr_number).await?;
    if let Some(sha) = &sha {
        env.state.set(&key, sha.clone()).await?;
    }
    Ok(sha)
}
