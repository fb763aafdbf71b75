use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use normalizer::payloads::WorkspacePayload;
use tracing::debug;

use crate::client::{query, BitbucketApi};
use crate::metrics::observe_fetch;
use crate::paginator::Paginator;

/// Workspaces the authenticated account is a member of.
pub async fn fetch_workspaces(api: &Arc<dyn BitbucketApi>) -> Result<Vec<WorkspacePayload>> {
    let start = Instant::now();
    let params = query([("pagelen", "100"), ("role", "member")]);
    let result = Paginator::new(Arc::clone(api), "workspaces", params)
        .collect_all::<WorkspacePayload>()
        .await
        .context("fetching workspaces");
    observe_fetch("workspaces", start, &result);
    if let Ok(workspaces) = &result {
        debug!(count = workspaces.len(), "finished fetching workspaces");
    }
    result
}

pub fn workspace_slugs(workspaces: &[WorkspacePayload]) -> Vec<String> {
    workspaces
        .iter()
        .map(|workspace| workspace.slug.clone())
        .collect()
}
