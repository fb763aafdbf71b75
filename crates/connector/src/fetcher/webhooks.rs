use std::sync::Arc;

use anyhow::{Context, Result};
use normalizer::payloads::{HookCreatePayload, HookPayload};

use crate::client::{decode, BitbucketApi};
use crate::paginator::Paginator;

fn hooks_endpoint(repo_full_name: &str) -> String {
    format!("repositories/{repo_full_name}/hooks")
}

pub async fn list_hooks(
    api: &Arc<dyn BitbucketApi>,
    repo_full_name: &str,
) -> Result<Vec<HookPayload>> {
    Paginator::new(Arc::clone(api), hooks_endpoint(repo_full_name), Vec::new())
        .collect_all::<HookPayload>()
        .await
        .with_context(|| format!("listing hooks for {repo_full_name}"))
}

pub async fn delete_hook(api: &dyn BitbucketApi, repo_full_name: &str, uuid: &str) -> Result<()> {
    api.delete(&format!("{}/{uuid}", hooks_endpoint(repo_full_name)))
        .await
        .with_context(|| format!("deleting hook {uuid} from {repo_full_name}"))
}

pub async fn create_hook(
    api: &dyn BitbucketApi,
    repo_full_name: &str,
    hook: &HookCreatePayload,
) -> Result<HookPayload> {
    let endpoint = hooks_endpoint(repo_full_name);
    let body = serde_json::to_vec(hook)?;
    let response = api
        .post(&endpoint, body)
        .await
        .with_context(|| format!("creating hook on {repo_full_name}"))?;
    decode(&endpoint, &response)
}
