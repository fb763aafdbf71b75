//! Bitbucket Cloud 2.0 wire formats. Only the fields the connector reads are
//! modelled; anything absent decodes to its default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PageEnvelope<T> {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub pagelen: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub values: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub html: Link,
    #[serde(default)]
    pub avatar: Link,
}

/// A user or app account as embedded in other payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPayload {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub links: Links,
}

impl AccountPayload {
    pub fn ref_id(&self) -> &str {
        &self.account_id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentUserPayload {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspacePayload {
    #[serde(default)]
    pub uuid: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceMembershipPayload {
    #[serde(default)]
    pub user: AccountPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitRef {
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceRef {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoPayload {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub mainbranch: Option<BranchRef>,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub workspace: Option<WorkspaceRef>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_on: Option<DateTime<Utc>>,
}

impl RepoPayload {
    /// Workspace slug, from the embedded workspace or the `full_name` prefix.
    pub fn workspace_slug(&self) -> &str {
        match &self.workspace {
            Some(workspace) if !workspace.slug.is_empty() => &workspace.slug,
            _ => self
                .full_name
                .split_once('/')
                .map(|(workspace, _)| workspace)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub markup: String,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointPayload {
    #[serde(default)]
    pub branch: BranchRef,
    #[serde(default)]
    pub commit: Option<CommitRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticipantPayload {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub participated_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: AccountPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author: AccountPayload,
    #[serde(default)]
    pub closed_by: Option<AccountPayload>,
    #[serde(default)]
    pub participants: Vec<ParticipantPayload>,
    #[serde(default)]
    pub source: EndpointPayload,
    #[serde(default)]
    pub destination: EndpointPayload,
    #[serde(default)]
    pub merge_commit: Option<CommitRef>,
    #[serde(default)]
    pub summary: Option<ContentPayload>,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub links: Links,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    pub id: i64,
    #[serde(default)]
    pub content: ContentPayload,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub user: AccountPayload,
    #[serde(default)]
    pub links: Links,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthorPayload {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub user: Option<AccountPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitPayload {
    pub hash: String,
    #[serde(default)]
    pub message: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub author: CommitAuthorPayload,
    #[serde(default)]
    pub links: Links,
}

/// A repository webhook subscription as returned by `/repositories/{repo}/hooks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookCreatePayload {
    pub active: bool,
    pub creator_id: String,
    pub description: String,
    pub events: Vec<String>,
    pub subject_key: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoEventPayload {
    pub repository: RepoPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEventPayload {
    pub pullrequest: PullRequestPayload,
    pub repository: RepoPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentEventPayload {
    pub pullrequest: PullRequestPayload,
    pub comment: CommentPayload,
    pub repository: RepoPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Slug(String);

    #[test]
    fn envelope_decodes_values_without_a_default() {
        let page: PageEnvelope<Slug> = serde_json::from_str(
            r#"{"page": 2, "values": ["acme", "partner"], "next": "https://api.bitbucket.org/2.0/workspaces?page=3"}"#,
        )
        .unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.values.len(), 2);
        assert_eq!(page.values[1].0, "partner");
        assert!(page.next.is_some());
    }

    #[test]
    fn count_only_envelope_has_no_values() {
        let page: PageEnvelope<Slug> = serde_json::from_str(r#"{"size": 7, "pagelen": 0}"#).unwrap();
        assert_eq!(page.size, 7);
        assert!(page.values.is_empty());
        assert!(page.next.is_none());
    }
}
