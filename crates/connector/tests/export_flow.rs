mod support;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::config::ConnectorConfig;
use connector::service::{read_watermark, WATERMARK_KEY};
use connector::Exporter;
use http::StatusCode;
use normalizer::models::{PullRequestStatus, RepoAffiliation};
use normalizer::{Record, RecordKind};
use serde_json::json;
use store::{MemoryPipe, MemoryState, StateStore};
use support::{account, comment, commit, pull_request, repo, reviewer, FakeBitbucket};

const PRS: &str = "repositories/acme/widgets/pullrequests";
const COMMENTS: &str = "repositories/acme/widgets/pullrequests/1/comments";
const COMMITS: &str = "repositories/acme/widgets/pullrequests/1/commits";
const MEMBERS: &str = "workspaces/acme/members";

fn config() -> ConnectorConfig {
    ConnectorConfig {
        customer_id: "cust-1".into(),
        integration_instance_id: "inst-1".into(),
        ref_type: "bitbucket".into(),
        concurrency: 3,
        historical: false,
        interval_secs: 0,
        run_once: true,
        accounts: Vec::new(),
        inclusions: Vec::new(),
        exclusions: Vec::new(),
    }
}

fn acme() -> Arc<FakeBitbucket> {
    let fake = FakeBitbucket::new();
    fake.values("workspaces", vec![json!({"slug": "acme", "name": "Acme"})])
        .values("repositories/acme", vec![repo("acme", "widgets", "{widgets}")])
        .values(
            PRS,
            vec![pull_request(
                1,
                "OPEN",
                "2024-05-01T12:00:00Z",
                vec![
                    reviewer("acc-approver", true, Some("2024-05-01T11:00:00Z")),
                    reviewer("acc-waiting", false, None),
                ],
            )],
        )
        .values(COMMENTS, vec![comment(10, "looks good")])
        .values(
            COMMITS,
            vec![
                commit("bbb222", "2024-05-01T10:00:00Z"),
                commit("aaa111", "2024-04-30T10:00:00Z"),
            ],
        )
        .values(MEMBERS, vec![json!({"user": account("acc-dev", "Dev")})]);
    fake
}

struct Run {
    state: Arc<MemoryState>,
    pipe: Arc<MemoryPipe>,
    exporter: Exporter,
}

fn exporter(fake: Arc<FakeBitbucket>, config: ConnectorConfig) -> Run {
    let state = Arc::new(MemoryState::new());
    let pipe = Arc::new(MemoryPipe::new());
    let exporter = Exporter::new(config, fake, state.clone(), pipe.clone()).unwrap();
    Run {
        state,
        pipe,
        exporter,
    }
}

fn pull_requests(records: &[Record]) -> Vec<&normalizer::models::PullRequest> {
    records
        .iter()
        .filter_map(|record| match record {
            Record::PullRequest(pr) => Some(pr),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn full_export_writes_every_entity_and_the_watermark() {
    let fake = acme();
    let run = exporter(fake.clone(), config());

    let report = run.exporter.run_once().await.unwrap();
    assert_eq!(report.workspaces, 1);
    assert_eq!(report.repos, 1);

    let expected = [
        (RecordKind::Repo, 1),
        (RecordKind::User, 1),
        (RecordKind::PullRequest, 1),
        (RecordKind::PullRequestComment, 1),
        (RecordKind::PullRequestCommit, 2),
        (RecordKind::PullRequestReview, 1),
        (RecordKind::PullRequestReviewRequest, 1),
    ];
    for (kind, count) in expected {
        assert_eq!(run.pipe.count(kind).await, count, "{}", kind.as_str());
        assert_eq!(report.written.get(&kind).copied().unwrap_or(0), count);
    }
    assert_eq!(run.pipe.count(RecordKind::ReviewRequestDeactivation).await, 0);
    assert!(run.pipe.flush_count().await >= 1);

    let records = run.pipe.records().await;
    let prs = pull_requests(&records);
    assert_eq!(prs[0].commit_shas, vec!["aaa111", "bbb222"]);
    let repos: Vec<_> = records
        .iter()
        .filter_map(|record| match record {
            Record::Repo(repo) => Some(repo),
            _ => None,
        })
        .collect();
    assert_eq!(repos[0].affiliation, RepoAffiliation::Organization);

    let watermark = read_watermark(run.state.as_ref()).await.unwrap().unwrap();
    assert_eq!(watermark, report.watermark);
    let raw = run.state.get(WATERMARK_KEY).await.unwrap().unwrap();
    assert!(raw.ends_with('Z'));
    assert_eq!(
        run.state.get("{widgets}.1").await.unwrap().as_deref(),
        Some("aaa111")
    );

    let listing = &fake.gets(PRS)[0];
    assert_eq!(listing.param("q"), None);
    assert_eq!(listing.param("pagelen"), Some("50"));
    let workspaces = &fake.gets("workspaces")[0];
    assert_eq!(workspaces.param("role"), Some("member"));
    assert_eq!(workspaces.param("pagelen"), Some("100"));
}

#[tokio::test]
async fn incremental_export_filters_by_watermark_and_skips_stale_pull_requests() {
    let fake = acme();
    let run = exporter(fake.clone(), config());
    run.state
        .set(WATERMARK_KEY, "2024-05-02T00:00:00Z".into())
        .await
        .unwrap();

    run.exporter.run_once().await.unwrap();

    let expected_q = "updated_on > 2024-05-02T00:00:00.000000000+00:00";
    for endpoint in ["repositories/acme", PRS, COMMENTS, COMMITS] {
        assert_eq!(fake.gets(endpoint)[0].param("q"), Some(expected_q), "{endpoint}");
    }
    assert_eq!(run.pipe.count(RecordKind::PullRequest).await, 0);
    assert_eq!(run.pipe.count(RecordKind::PullRequestComment).await, 1);

    let watermark = read_watermark(run.state.as_ref()).await.unwrap().unwrap();
    assert!(watermark > Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn historical_export_ignores_the_watermark() {
    let fake = acme();
    let run = exporter(
        fake.clone(),
        ConnectorConfig {
            historical: true,
            ..config()
        },
    );
    run.state
        .set(WATERMARK_KEY, "2024-05-02T00:00:00Z".into())
        .await
        .unwrap();

    run.exporter.run_once().await.unwrap();
    assert_eq!(fake.gets(PRS)[0].param("q"), None);
    assert_eq!(run.pipe.count(RecordKind::PullRequest).await, 1);
}

#[tokio::test]
async fn failed_export_leaves_the_watermark_untouched() {
    let fake = acme();
    fake.status(COMMENTS, StatusCode::INTERNAL_SERVER_ERROR);
    let run = exporter(fake, config());

    let err = run.exporter.run_once().await.unwrap_err();
    assert_eq!(
        connector::client::api_status(&err),
        Some(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert_eq!(run.state.get(WATERMARK_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn missing_commits_still_export_the_pull_request() {
    let fake = acme();
    fake.status(COMMITS, StatusCode::NOT_FOUND);
    let run = exporter(fake, config());

    run.exporter.run_once().await.unwrap();
    let records = run.pipe.records().await;
    let prs = pull_requests(&records);
    assert_eq!(prs.len(), 1);
    assert!(prs[0].commit_shas.is_empty());
    assert_eq!(run.pipe.count(RecordKind::PullRequestCommit).await, 0);
    assert_eq!(run.state.get("{widgets}.1").await.unwrap(), None);
}

#[tokio::test]
async fn hidden_members_are_tolerated() {
    let fake = acme();
    fake.status(MEMBERS, StatusCode::FORBIDDEN);
    let run = exporter(fake, config());

    let report = run.exporter.run_once().await.unwrap();
    assert_eq!(run.pipe.count(RecordKind::User).await, 0);
    assert_eq!(run.pipe.count(RecordKind::PullRequest).await, 1);
    assert!(run.state.get(WATERMARK_KEY).await.unwrap().is_some());
    assert_eq!(report.repos, 1);
}

#[tokio::test]
async fn excluded_repositories_are_not_exported() {
    let fake = acme();
    fake.values(
        "repositories/acme",
        vec![
            repo("acme", "widgets", "{widgets}"),
            repo("acme", "legacy-api", "{legacy}"),
        ],
    );
    let run = exporter(
        fake.clone(),
        ConnectorConfig {
            exclusions: vec!["acme/legacy*".into()],
            ..config()
        },
    );

    let report = run.exporter.run_once().await.unwrap();
    assert_eq!(report.repos, 1);
    assert_eq!(run.pipe.count(RecordKind::Repo).await, 1);
    assert!(fake
        .gets("repositories/acme/legacy-api/pullrequests")
        .is_empty());
}

#[tokio::test]
async fn configured_accounts_are_exported_as_third_party() {
    let fake = acme();
    fake.values("workspaces", Vec::new())
        .values(MEMBERS, Vec::new());
    let run = exporter(
        fake,
        ConnectorConfig {
            accounts: vec!["acme".into()],
            ..config()
        },
    );

    run.exporter.run_once().await.unwrap();
    let records = run.pipe.records().await;
    let affiliation = records.iter().find_map(|record| match record {
        Record::Repo(repo) => Some(repo.affiliation),
        _ => None,
    });
    assert_eq!(affiliation, Some(RepoAffiliation::ThirdParty));
}

#[tokio::test]
async fn two_pull_requests_on_one_page_keep_their_own_commits() {
    let fake = acme();
    let mut merged = pull_request(2, "MERGED", "2024-05-01T13:00:00Z", Vec::new());
    merged["merge_commit"] = json!({"hash": "mmm"});
    fake.values(
        PRS,
        vec![
            pull_request(1, "OPEN", "2024-05-01T12:00:00Z", Vec::new()),
            merged,
        ],
    )
    .values(
        COMMITS,
        vec![
            commit("c3", "2024-05-01T10:00:00Z"),
            commit("c2", "2024-04-30T10:00:00Z"),
            commit("c1", "2024-04-29T10:00:00Z"),
        ],
    )
    .values(
        "repositories/acme/widgets/pullrequests/2/commits",
        vec![commit("d1", "2024-05-01T11:00:00Z")],
    )
    .values("repositories/acme/widgets/pullrequests/2/comments", Vec::new());
    let run = exporter(fake, config());

    run.exporter.run_once().await.unwrap();

    let expected = [
        (RecordKind::Repo, 1),
        (RecordKind::PullRequest, 2),
        (RecordKind::PullRequestCommit, 4),
        (RecordKind::PullRequestComment, 1),
        (RecordKind::ReviewRequestDeactivation, 0),
    ];
    for (kind, count) in expected {
        assert_eq!(run.pipe.count(kind).await, count, "{}", kind.as_str());
    }

    let records = run.pipe.records().await;
    let prs = pull_requests(&records);
    let open = prs.iter().find(|pr| pr.identifier == "#1").unwrap();
    assert_eq!(open.status, Some(PullRequestStatus::Open));
    assert_eq!(open.commit_shas, vec!["c1", "c2", "c3"]);
    let merged = prs.iter().find(|pr| pr.identifier == "#2").unwrap();
    assert_eq!(merged.status, Some(PullRequestStatus::Merged));
    assert_eq!(merged.commit_shas, vec!["d1"]);
    assert_eq!(merged.merge_sha.as_deref(), Some("mmm"));
    assert!(run.state.get(WATERMARK_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn commit_failure_drops_the_pull_request_and_keeps_the_watermark() {
    let fake = acme();
    fake.status(COMMITS, StatusCode::INTERNAL_SERVER_ERROR);
    let run = exporter(fake, config());

    let err = run.exporter.run_once().await.unwrap_err();
    assert_eq!(
        connector::client::api_status(&err),
        Some(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert_eq!(run.pipe.count(RecordKind::PullRequest).await, 0);
    assert_eq!(run.state.get(WATERMARK_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn queued_repositories_finish_before_a_workspace_error_returns() {
    let fake = acme();
    let slugs = ["widgets", "gears", "levers", "pulleys"];
    fake.values(
        "repositories/acme",
        slugs
            .iter()
            .map(|slug| repo("acme", slug, &format!("{{{slug}}}")))
            .collect(),
    );
    for slug in &slugs[1..] {
        fake.values(&format!("repositories/acme/{slug}/pullrequests"), Vec::new());
    }
    fake.status(MEMBERS, StatusCode::INTERNAL_SERVER_ERROR);
    let run = exporter(
        fake.clone(),
        ConnectorConfig {
            concurrency: 1,
            ..config()
        },
    );

    run.exporter.run_once().await.unwrap_err();

    for slug in slugs {
        let listing = format!("repositories/acme/{slug}/pullrequests");
        assert_eq!(fake.gets(&listing).len(), 1, "{listing}");
    }
    assert_eq!(fake.gets(COMMITS).len(), 1);
    assert_eq!(run.state.get(WATERMARK_KEY).await.unwrap(), None);
}
