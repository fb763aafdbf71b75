mod support;

use std::sync::Arc;

use connector::registration::{delivery_url, WEBHOOK_DESCRIPTION};
use connector::{RegistrationReport, WebhookEvent, WebhookRegistrar};
use http::StatusCode;
use serde_json::{json, Value};
use support::{repo, FakeBitbucket};
use url::Url;

const CALLBACK: &str = "https://hooks.example.com/bitbucket?customer=cust-1";
const HOOKS: &str = "repositories/acme/widgets/hooks";

fn bitbucket(hooks: Vec<Value>) -> Arc<FakeBitbucket> {
    let fake = FakeBitbucket::new();
    fake.object("user", json!({"uuid": "{me}", "display_name": "Me"}))
        .values("workspaces", vec![json!({"slug": "acme"})])
        .values("repositories/acme", vec![repo("acme", "widgets", "{widgets}")])
        .values(HOOKS, hooks);
    fake
}

fn current_hooks() -> Vec<Value> {
    let callback = Url::parse(CALLBACK).unwrap();
    WebhookEvent::ALL
        .iter()
        .enumerate()
        .map(|(n, event)| {
            json!({
                "uuid": format!("{{hook-{n}}}"),
                "description": WEBHOOK_DESCRIPTION,
                "url": delivery_url(&callback, *event),
                "active": true,
                "events": [event.as_str()],
            })
        })
        .collect()
}

fn registrar(fake: &Arc<FakeBitbucket>) -> WebhookRegistrar {
    WebhookRegistrar::new(fake.clone(), Some(CALLBACK.to_string()), 2)
}

#[tokio::test]
async fn installs_one_hook_per_event() {
    let fake = bitbucket(Vec::new());
    let report = registrar(&fake).register().await.unwrap();
    assert_eq!(
        report,
        RegistrationReport {
            repos: 1,
            installed: 1,
            ..RegistrationReport::default()
        }
    );

    let posts = fake.calls_with("POST");
    assert_eq!(posts.len(), WebhookEvent::ALL.len());
    let first = posts[0].body.as_ref().unwrap();
    assert_eq!(posts[0].endpoint, HOOKS);
    assert_eq!(first["creator_id"], "user:{me}");
    assert_eq!(first["subject_key"], "repository:{widgets}");
    assert_eq!(first["description"], WEBHOOK_DESCRIPTION);
    assert_eq!(first["events"], json!(["repo:updated"]));
    assert_eq!(
        first["url"],
        "https://hooks.example.com/bitbucket?customer=cust-1&version=1&event=repo%3Aupdated"
    );
    assert!(fake.calls_with("DELETE").is_empty());
}

#[tokio::test]
async fn current_hooks_are_left_alone() {
    let fake = bitbucket(current_hooks());
    let report = registrar(&fake).register().await.unwrap();
    assert_eq!(report.up_to_date, 1);
    assert_eq!(report.installed, 0);
    assert!(fake.calls_with("POST").is_empty());
    assert!(fake.calls_with("DELETE").is_empty());
}

#[tokio::test]
async fn stale_hooks_are_replaced() {
    let mut hooks = current_hooks();
    hooks[0]["url"] = json!("https://hooks.example.com/bitbucket?version=0&event=repo%3Aupdated");
    hooks.push(json!({
        "uuid": "{someone-else}",
        "description": "ci notifications",
        "url": "https://ci.example.com/hook",
        "events": ["repo:push"],
    }));
    let fake = bitbucket(hooks);

    let report = registrar(&fake).register().await.unwrap();
    assert_eq!(report.installed, 1);
    let deleted: Vec<String> = fake
        .calls_with("DELETE")
        .into_iter()
        .map(|call| call.endpoint)
        .collect();
    assert_eq!(deleted.len(), WebhookEvent::ALL.len());
    assert!(!deleted.iter().any(|endpoint| endpoint.contains("someone-else")));
    assert!(deleted.contains(&format!("{HOOKS}/{{hook-0}}")));
    assert_eq!(fake.calls_with("POST").len(), WebhookEvent::ALL.len());
}

#[tokio::test]
async fn unregister_removes_only_our_hooks() {
    let mut hooks = current_hooks();
    hooks.push(json!({
        "uuid": "{someone-else}",
        "description": "ci notifications",
        "url": "https://ci.example.com/hook",
    }));
    let fake = bitbucket(hooks);

    let report = WebhookRegistrar::new(fake.clone(), None, 2)
        .unregister()
        .await
        .unwrap();
    assert_eq!(report.removed, 1);
    let deleted = fake.calls_with("DELETE");
    assert_eq!(deleted.len(), WebhookEvent::ALL.len());
    assert!(deleted
        .iter()
        .all(|call| !call.endpoint.ends_with("{someone-else}")));
    assert!(fake.gets("user").is_empty());
}

#[tokio::test]
async fn failing_repository_is_counted_and_the_rest_continue() {
    let fake = bitbucket(Vec::new());
    fake.values(
        "repositories/acme",
        vec![
            repo("acme", "widgets", "{widgets}"),
            repo("acme", "locked", "{locked}"),
        ],
    )
    .values("repositories/acme/locked/hooks", Vec::new())
    .fail_posts("repositories/acme/locked/hooks", StatusCode::FORBIDDEN);

    let report = registrar(&fake).register().await.unwrap();
    assert_eq!(report.repos, 2);
    assert_eq!(report.installed, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn register_requires_a_callback_url() {
    let fake = bitbucket(Vec::new());
    let err = WebhookRegistrar::new(fake.clone(), None, 2)
        .register()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("callback_url"));
    assert!(fake.calls().is_empty());
}
