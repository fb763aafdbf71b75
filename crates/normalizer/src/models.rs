use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepoVisibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepoAffiliation {
    Organization,
    ThirdParty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Human,
    Bot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestStatus {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub id: String,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub name: String,
    pub description: String,
    pub default_branch: String,
    pub language: String,
    pub url: String,
    pub visibility: RepoVisibility,
    pub affiliation: RepoAffiliation,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub url: Option<String>,
    pub user_type: UserType,
    pub member: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequest {
    pub id: String,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub repo_id: String,
    pub branch_id: String,
    pub branch_name: String,
    pub destination_branch_name: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub identifier: String,
    pub created_by_ref_id: String,
    pub status: Option<PullRequestStatus>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub closed_date: Option<DateTime<Utc>>,
    pub closed_by_ref_id: Option<String>,
    pub merged_date: Option<DateTime<Utc>>,
    pub merged_by_ref_id: Option<String>,
    pub merge_sha: Option<String>,
    pub merge_commit_id: Option<String>,
    pub commit_shas: Vec<String>,
    pub commit_ids: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestComment {
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub repo_id: String,
    pub pull_request_id: String,
    pub user_ref_id: String,
    pub body: String,
    pub url: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestCommit {
    pub id: String,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub repo_id: String,
    pub pull_request_id: String,
    pub sha: String,
    pub message: String,
    pub url: String,
    pub author_ref_id: String,
    pub committer_ref_id: String,
    pub created_date: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestReview {
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub repo_id: String,
    pub pull_request_id: String,
    pub user_ref_id: String,
    pub state: ReviewState,
    pub created_date: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestReviewRequest {
    pub id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub pull_request_id: String,
    pub requested_reviewer_ref_id: String,
    pub created_date: DateTime<Utc>,
    pub active: bool,
}

/// Partial update marking a previously emitted review request inactive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRequestDeactivation {
    pub id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Record {
    Repo(Repo),
    User(User),
    PullRequest(PullRequest),
    PullRequestComment(PullRequestComment),
    PullRequestCommit(PullRequestCommit),
    PullRequestReview(PullRequestReview),
    PullRequestReviewRequest(PullRequestReviewRequest),
    ReviewRequestDeactivation(ReviewRequestDeactivation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Repo,
    User,
    PullRequest,
    PullRequestComment,
    PullRequestCommit,
    PullRequestReview,
    PullRequestReviewRequest,
    ReviewRequestDeactivation,
}

impl RecordKind {
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Repo,
        RecordKind::User,
        RecordKind::PullRequest,
        RecordKind::PullRequestComment,
        RecordKind::PullRequestCommit,
        RecordKind::PullRequestReview,
        RecordKind::PullRequestReviewRequest,
        RecordKind::ReviewRequestDeactivation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Repo => "repo",
            RecordKind::User => "user",
            RecordKind::PullRequest => "pull_request",
            RecordKind::PullRequestComment => "pull_request_comment",
            RecordKind::PullRequestCommit => "pull_request_commit",
            RecordKind::PullRequestReview => "pull_request_review",
            RecordKind::PullRequestReviewRequest => "pull_request_review_request",
            RecordKind::ReviewRequestDeactivation => "review_request_deactivation",
        }
    }
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Repo(_) => RecordKind::Repo,
            Record::User(_) => RecordKind::User,
            Record::PullRequest(_) => RecordKind::PullRequest,
            Record::PullRequestComment(_) => RecordKind::PullRequestComment,
            Record::PullRequestCommit(_) => RecordKind::PullRequestCommit,
            Record::PullRequestReview(_) => RecordKind::PullRequestReview,
            Record::PullRequestReviewRequest(_) => RecordKind::PullRequestReviewRequest,
            Record::ReviewRequestDeactivation(_) => RecordKind::ReviewRequestDeactivation,
        }
    }
}

macro_rules! impl_from_record {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Record {
                fn from(value: $variant) -> Self {
                    Record::$variant(value)
                }
            }
        )*
    };
}

impl_from_record!(
    Repo,
    User,
    PullRequest,
    PullRequestComment,
    PullRequestCommit,
    PullRequestReview,
    PullRequestReviewRequest,
    ReviewRequestDeactivation,
);
