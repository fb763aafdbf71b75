//! Deterministic identifiers for normalized records. Every id is a hash of the
//! customer, the connector ref type and the natural key chain, so re-syncing
//! the same entity always yields the same id.

use common::ids::derive_id;

pub fn repo_id(customer_id: &str, repo_ref: &str, ref_type: &str) -> String {
    derive_id(&["repo", customer_id, repo_ref, ref_type])
}

pub fn pull_request_id(customer_id: &str, pr_ref: &str, ref_type: &str, repo_ref: &str) -> String {
    derive_id(&["pull_request", customer_id, pr_ref, ref_type, repo_ref])
}

pub fn commit_id(customer_id: &str, sha: &str, ref_type: &str, repo_id: &str) -> String {
    derive_id(&["commit", customer_id, sha, ref_type, repo_id])
}

pub fn branch_id(
    customer_id: &str,
    repo_id: &str,
    ref_type: &str,
    branch_name: &str,
    first_commit_id: &str,
) -> String {
    derive_id(&[
        "branch",
        customer_id,
        repo_id,
        ref_type,
        branch_name,
        first_commit_id,
    ])
}

pub fn review_request_id(customer_id: &str, ref_type: &str, pr_id: &str, reviewer: &str) -> String {
    derive_id(&["review_request", customer_id, ref_type, pr_id, reviewer])
}

pub fn review_ref_id(pr_ref: &str, reviewer: &str) -> String {
    derive_id(&["review", pr_ref, reviewer])
}
