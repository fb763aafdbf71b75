use std::sync::Arc;

use anyhow::{Context, Result};
use normalizer::payloads::{CurrentUserPayload, WorkspacePayload};
use serde::Serialize;

use crate::client::BitbucketApi;
use crate::fetcher::{fetch_current_user, fetch_repo_count, fetch_workspaces};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    User,
    Org,
}

/// A workspace the credentials can export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: String,
    pub account_type: AccountType,
    pub name: String,
    pub slug: String,
    pub public: bool,
    pub repo_count: i64,
}

/// A workspace named after the user's display name is the user's own.
pub fn is_user_workspace(workspace: &WorkspacePayload, user: &CurrentUserPayload) -> bool {
    workspace.name == user.display_name
}

pub async fn discover_accounts(api: &Arc<dyn BitbucketApi>) -> Result<Vec<Account>> {
    let workspaces = fetch_workspaces(api)
        .await
        .context("error fetching user workspaces")?;
    let user = fetch_current_user(api.as_ref())
        .await
        .context("error fetching current user")?;

    let mut accounts = Vec::with_capacity(workspaces.len());
    for workspace in workspaces {
        let repo_count = fetch_repo_count(api.as_ref(), &workspace.slug).await?;
        let account_type = if is_user_workspace(&workspace, &user) {
            AccountType::User
        } else {
            AccountType::Org
        };
        accounts.push(Account {
            id: workspace.uuid,
            account_type,
            name: workspace.name,
            slug: workspace.slug,
            public: !workspace.is_private,
            repo_count,
        });
    }
    Ok(accounts)
}
