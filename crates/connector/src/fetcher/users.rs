use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use normalizer::convert_user;
use normalizer::payloads::WorkspaceMembershipPayload;
use tracing::debug;

use crate::client::{is_forbidden, ApiEnv};
use crate::metrics::{observe_fetch, ABSENCE_SKIPS_TOTAL};
use crate::paginator::Paginator;

/// Emits a user record per workspace member. A workspace whose member list is
/// not visible to the credentials yields no users.
pub async fn fetch_users(env: &ApiEnv, workspace: &str) -> Result<usize> {
    debug!(workspace, "fetching users");
    let start = Instant::now();
    let result = emit_members(env, workspace).await;
    observe_fetch("users", start, &result);
    match result {
        Ok(count) => {
            debug!(workspace, count, "finished fetching users");
            Ok(count)
        }
        Err(err) if is_forbidden(&err) => {
            ABSENCE_SKIPS_TOTAL.with_label_values(&["users"]).inc();
            debug!(workspace, error = %err, "workspace members are not visible, skipping");
            Ok(0)
        }
        Err(err) => Err(err.context(format!("fetching users for {workspace}"))),
    }
}

async fn emit_members(env: &ApiEnv, workspace: &str) -> Result<usize> {
    let mut pager = Paginator::new(
        Arc::clone(&env.api),
        format!("workspaces/{workspace}/members"),
        Vec::new(),
    );
    let mut count = 0;
    while let Some(members) = pager.next_page::<WorkspaceMembershipPayload>().await? {
        for member in members {
            env.sink
                .emit(convert_user(&env.ctx, &member.user).into())
                .await?;
            count += 1;
        }
    }
    Ok(count)
}
