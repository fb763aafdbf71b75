use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use normalizer::convert_comment;
use normalizer::payloads::CommentPayload;
use tracing::debug;

use crate::client::ApiEnv;
use crate::fetcher::updated_since;
use crate::metrics::observe_fetch;
use crate::paginator::Paginator;

pub async fn fetch_comments(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    pr_number: i64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<usize> {
    let start = Instant::now();
    let result = emit_comments(env, repo_full_name, repo_ref, pr_number, cutoff)
        .await
        .with_context(|| format!("fetching comments for {repo_full_name}#{pr_number}"));
    observe_fetch("comments", start, &result);
    if let Ok(count) = &result {
        debug!(repo = repo_full_name, pr = pr_number, count, "finished fetching comments");
    }
    result
}

async fn emit_comments(
    env: &ApiEnv,
    repo_full_name: &str,
    repo_ref: &str,
    pr_number: i64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<usize> {
    let pr_ref = pr_number.to_string();
    let mut pager = Paginator::new(
        Arc::clone(&env.api),
        format!("repositories/{repo_full_name}/pullrequests/{pr_number}/comments"),
        updated_since(cutoff),
    );
    let mut count = 0;
    while let Some(comments) = pager.next_page::<CommentPayload>().await? {
        for comment in &comments {
            env.sink
                .emit(convert_comment(&env.ctx, comment, repo_ref, &pr_ref).into())
                .await?;
        }
        count += comments.len();
    }
    Ok(count)
}
