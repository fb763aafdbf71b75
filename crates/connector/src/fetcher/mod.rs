use chrono::{DateTime, Utc};

use crate::client::QueryParams;

pub mod comments;
pub mod commits;
pub mod current_user;
pub mod pull_requests;
pub mod repos;
pub mod reviews;
pub mod users;
pub mod webhooks;
pub mod workspaces;

pub use comments::fetch_comments;
pub use commits::{fetch_commits, fetch_first_commit_sha};
pub use current_user::fetch_current_user;
pub use pull_requests::fetch_pull_requests;
pub use repos::{fetch_repo_count, fetch_repos, repos_paginator};
pub use reviews::sync_reviews;
pub use users::fetch_users;
pub use workspaces::{fetch_workspaces, workspace_slugs};

const CUTOFF_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f%:z";

pub fn format_cutoff(cutoff: DateTime<Utc>) -> String {
    cutoff.format(CUTOFF_FORMAT).to_string()
}

/// `q`/`sort` pair restricting a listing to entities updated after `cutoff`,
/// newest first.
pub fn updated_since(cutoff: Option<DateTime<Utc>>) -> QueryParams {
    let mut params = Vec::with_capacity(2);
    if let Some(cutoff) = cutoff {
        params.push(("q".to_string(), format!("updated_on > {}", format_cutoff(cutoff))));
    }
    params.push(("sort".to_string(), "-updated_on".to_string()));
    params
}

/// State key holding the first commit sha of a pull request.
pub fn first_sha_key(repo_ref: &str, pr_ref: &str) -> String {
    format!("{repo_ref}.{pr_ref}")
}

/// State key holding the outstanding review request ids of a pull request.
pub fn review_requests_key(pr_id: &str) -> String {
    format!("review_requests:{pr_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_rendered_with_nanoseconds_and_offset() {
        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(format_cutoff(cutoff), "2024-05-01T10:00:00.123456789+00:00");
    }

    #[test]
    fn full_sync_only_sorts() {
        assert_eq!(
            updated_since(None),
            vec![("sort".to_string(), "-updated_on".to_string())]
        );
        let params = updated_since(Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));
        assert_eq!(params[0].1, "updated_on > 2024-01-02T03:04:05.000000000+00:00");
    }
}
