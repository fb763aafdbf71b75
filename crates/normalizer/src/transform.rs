use common::config::ConnectorConfig;
use tracing::warn;

use crate::ids;
use crate::markup::render_source_html;
use crate::models::{
    PullRequest, PullRequestComment, PullRequestCommit, PullRequestReview,
    PullRequestReviewRequest, PullRequestStatus, Repo, RepoAffiliation, RepoVisibility,
    ReviewRequestDeactivation, ReviewState, User, UserType,
};
use crate::payloads::{
    AccountPayload, CommentPayload, CommitPayload, PullRequestPayload, RepoPayload,
};

/// Identity shared by every record a connector instance emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertContext {
    pub customer_id: String,
    pub integration_instance_id: String,
    pub ref_type: String,
}

impl ConvertContext {
    pub fn new(
        customer_id: impl Into<String>,
        integration_instance_id: impl Into<String>,
        ref_type: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            integration_instance_id: integration_instance_id.into(),
            ref_type: ref_type.into(),
        }
    }

    pub fn repo_id(&self, repo_ref: &str) -> String {
        ids::repo_id(&self.customer_id, repo_ref, &self.ref_type)
    }

    pub fn pull_request_id(&self, pr_ref: &str, repo_ref: &str) -> String {
        ids::pull_request_id(&self.customer_id, pr_ref, &self.ref_type, repo_ref)
    }

    pub fn commit_id(&self, sha: &str, repo_id: &str) -> String {
        ids::commit_id(&self.customer_id, sha, &self.ref_type, repo_id)
    }
}

impl From<&ConnectorConfig> for ConvertContext {
    fn from(config: &ConnectorConfig) -> Self {
        Self::new(
            config.customer_id.clone(),
            config.integration_instance_id.clone(),
            config.ref_type.clone(),
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn convert_repo(
    ctx: &ConvertContext,
    payload: &RepoPayload,
    affiliation: RepoAffiliation,
) -> Repo {
    let visibility = if payload.is_private {
        RepoVisibility::Private
    } else {
        RepoVisibility::Public
    };
    Repo {
        id: ctx.repo_id(&payload.uuid),
        ref_id: payload.uuid.clone(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        name: payload.full_name.clone(),
        description: payload.description.clone(),
        default_branch: payload
            .mainbranch
            .as_ref()
            .map(|branch| branch.name.clone())
            .unwrap_or_default(),
        language: payload.language.clone(),
        url: payload.links.html.href.clone(),
        visibility,
        affiliation,
        active: true,
    }
}

pub fn convert_user(ctx: &ConvertContext, payload: &AccountPayload) -> User {
    let user_type = if payload.account_type == "user" {
        UserType::Human
    } else {
        UserType::Bot
    };
    User {
        ref_id: payload.ref_id().to_string(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        name: payload.display_name.clone(),
        avatar_url: non_empty(&payload.links.avatar.href),
        url: non_empty(&payload.links.html.href),
        user_type,
        member: true,
    }
}

/// Converts a pull request. `commit_shas` is ordered oldest first; the first
/// entry anchors the branch identity.
pub fn convert_pull_request(
    ctx: &ConvertContext,
    payload: &PullRequestPayload,
    repo_ref: &str,
    commit_shas: &[String],
) -> PullRequest {
    let pr_ref = payload.id.to_string();
    let repo_id = ctx.repo_id(repo_ref);
    let first_sha = commit_shas.first().map(String::as_str).unwrap_or_default();
    let first_commit_id = ctx.commit_id(first_sha, &repo_id);
    let branch_name = payload.source.branch.name.clone();

    let mut pr = PullRequest {
        id: ctx.pull_request_id(&pr_ref, repo_ref),
        ref_id: pr_ref.clone(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        branch_id: ids::branch_id(
            &ctx.customer_id,
            &repo_id,
            &ctx.ref_type,
            &branch_name,
            &first_commit_id,
        ),
        branch_name,
        destination_branch_name: payload.destination.branch.name.clone(),
        title: payload.title.clone(),
        description: render_source_html(&payload.description),
        url: payload.links.html.href.clone(),
        identifier: format!("#{}", payload.id),
        created_by_ref_id: payload.author.ref_id().to_string(),
        status: None,
        created_date: payload.created_on,
        updated_date: payload.updated_on,
        closed_date: None,
        closed_by_ref_id: None,
        merged_date: None,
        merged_by_ref_id: None,
        merge_sha: None,
        merge_commit_id: None,
        commit_ids: commit_shas
            .iter()
            .map(|sha| ctx.commit_id(sha, &repo_id))
            .collect(),
        commit_shas: commit_shas.to_vec(),
        repo_id,
        active: true,
    };

    let closed_by = payload
        .closed_by
        .as_ref()
        .and_then(|account| non_empty(account.ref_id()));

    match payload.state.as_str() {
        "OPEN" => pr.status = Some(PullRequestStatus::Open),
        "DECLINED" => {
            pr.status = Some(PullRequestStatus::Closed);
            pr.closed_by_ref_id = closed_by;
            pr.closed_date = Some(payload.updated_on);
        }
        "MERGED" => {
            let merge_sha = payload
                .merge_commit
                .as_ref()
                .and_then(|commit| non_empty(&commit.hash));
            pr.status = Some(PullRequestStatus::Merged);
            pr.merge_commit_id = merge_sha
                .as_deref()
                .map(|sha| ctx.commit_id(sha, &pr.repo_id));
            pr.merge_sha = merge_sha;
            pr.merged_by_ref_id = closed_by;
            pr.merged_date = Some(payload.updated_on);
        }
        other => {
            warn!(state = other, pr = %pr.ref_id, repo = repo_ref, "pull request has an unknown state");
        }
    }
    pr
}

pub fn convert_comment(
    ctx: &ConvertContext,
    payload: &CommentPayload,
    repo_ref: &str,
    pr_ref: &str,
) -> PullRequestComment {
    PullRequestComment {
        ref_id: payload.id.to_string(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        repo_id: ctx.repo_id(repo_ref),
        pull_request_id: ctx.pull_request_id(pr_ref, repo_ref),
        user_ref_id: payload.user.ref_id().to_string(),
        body: render_source_html(&payload.content.raw),
        url: payload.links.html.href.clone(),
        created_date: payload.created_on,
        updated_date: payload.updated_on,
        active: !payload.deleted,
    }
}

pub fn convert_commit(
    ctx: &ConvertContext,
    payload: &CommitPayload,
    repo_ref: &str,
    pr_ref: &str,
) -> PullRequestCommit {
    let repo_id = ctx.repo_id(repo_ref);
    let author_ref = commit_author_ref(payload);
    PullRequestCommit {
        id: ctx.commit_id(&payload.hash, &repo_id),
        ref_id: payload.hash.clone(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        pull_request_id: ctx.pull_request_id(pr_ref, repo_ref),
        repo_id,
        sha: payload.hash.clone(),
        message: payload.message.clone(),
        url: payload.links.html.href.clone(),
        committer_ref_id: author_ref.clone(),
        author_ref_id: author_ref,
        created_date: payload.date,
        active: true,
    }
}

// Commits authored by unlinked emails carry only the raw author string.
fn commit_author_ref(payload: &CommitPayload) -> String {
    match &payload.author.user {
        Some(user) if !user.account_id.is_empty() => user.account_id.clone(),
        Some(user) if !user.uuid.is_empty() => user.uuid.clone(),
        _ => payload.author.raw.clone(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewExtraction {
    pub reviews: Vec<PullRequestReview>,
    pub requests: Vec<PullRequestReviewRequest>,
}

impl ReviewExtraction {
    pub fn request_ids(&self) -> Vec<String> {
        self.requests.iter().map(|request| request.id.clone()).collect()
    }
}

/// Derives reviews and outstanding review requests from the reviewer
/// participants of a pull request.
pub fn extract_reviews(
    ctx: &ConvertContext,
    payload: &PullRequestPayload,
    repo_ref: &str,
) -> ReviewExtraction {
    let pr_ref = payload.id.to_string();
    let pr_id = ctx.pull_request_id(&pr_ref, repo_ref);
    let repo_id = ctx.repo_id(repo_ref);
    let mut extraction = ReviewExtraction::default();

    for participant in payload
        .participants
        .iter()
        .filter(|participant| participant.role == "REVIEWER")
    {
        let reviewer = participant.user.ref_id();
        let state = match (participant.approved, participant.participated_on) {
            (true, _) => ReviewState::Approved,
            (false, Some(_)) => ReviewState::Pending,
            (false, None) => {
                extraction.requests.push(PullRequestReviewRequest {
                    id: ids::review_request_id(
                        &ctx.customer_id,
                        &ctx.ref_type,
                        &pr_id,
                        reviewer,
                    ),
                    ref_type: ctx.ref_type.clone(),
                    customer_id: ctx.customer_id.clone(),
                    integration_instance_id: ctx.integration_instance_id.clone(),
                    pull_request_id: pr_id.clone(),
                    requested_reviewer_ref_id: reviewer.to_string(),
                    created_date: payload.updated_on,
                    active: true,
                });
                continue;
            }
        };
        extraction.reviews.push(PullRequestReview {
            ref_id: ids::review_ref_id(&pr_ref, reviewer),
            ref_type: ctx.ref_type.clone(),
            customer_id: ctx.customer_id.clone(),
            integration_instance_id: ctx.integration_instance_id.clone(),
            repo_id: repo_id.clone(),
            pull_request_id: pr_id.clone(),
            user_ref_id: reviewer.to_string(),
            state,
            created_date: participant.participated_on,
            active: true,
        });
    }
    extraction
}

pub fn deactivate_review_request(ctx: &ConvertContext, request_id: &str) -> ReviewRequestDeactivation {
    ReviewRequestDeactivation {
        id: request_id.to_string(),
        ref_type: ctx.ref_type.clone(),
        customer_id: ctx.customer_id.clone(),
        active: false,
    }
}
