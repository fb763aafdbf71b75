use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use normalizer::payloads::{HookCreatePayload, HookPayload, RepoPayload};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::async_pool::AsyncPool;
use crate::client::BitbucketApi;
use crate::fetcher::webhooks::{create_hook, delete_hook, list_hooks};
use crate::fetcher::{fetch_current_user, fetch_repos, fetch_workspaces, workspace_slugs};
use crate::metrics::WEBHOOK_REGISTRATIONS_TOTAL;
use crate::webhook::WebhookEvent;

/// Bumping this reinstalls every hook on the next registration.
pub const WEBHOOK_VERSION: &str = "1";
/// Marks hooks owned by this connector.
pub const WEBHOOK_DESCRIPTION: &str = "pinpoint_webhooks";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub repos: usize,
    pub installed: usize,
    pub up_to_date: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Tally {
    repos: AtomicUsize,
    installed: AtomicUsize,
    up_to_date: AtomicUsize,
    removed: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn bump(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Installed => &self.installed,
            Outcome::UpToDate => &self.up_to_date,
            Outcome::Removed => &self.removed,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        WEBHOOK_REGISTRATIONS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    fn report(&self) -> RegistrationReport {
        RegistrationReport {
            repos: self.repos.load(Ordering::SeqCst),
            installed: self.installed.load(Ordering::SeqCst),
            up_to_date: self.up_to_date.load(Ordering::SeqCst),
            removed: self.removed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Installed,
    UpToDate,
    Removed,
    Failed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Installed => "installed",
            Outcome::UpToDate => "up_to_date",
            Outcome::Removed => "removed",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Register,
    Unregister,
}

/// Installs or removes the connector's repository webhooks.
pub struct WebhookRegistrar {
    api: Arc<dyn BitbucketApi>,
    callback_url: Option<String>,
    concurrency: usize,
}

impl WebhookRegistrar {
    pub fn new(
        api: Arc<dyn BitbucketApi>,
        callback_url: Option<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            api,
            callback_url,
            concurrency,
        }
    }

    pub async fn register(&self) -> Result<RegistrationReport> {
        let callback = self
            .callback_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("webhook.callback_url is required to register webhooks"))?;
        let callback = Url::parse(callback).context("invalid webhook.callback_url")?;
        let user = fetch_current_user(self.api.as_ref()).await?;
        let creator = Arc::new(Creator {
            callback,
            user_uuid: user.uuid,
        });
        self.each_repo(Mode::Register, Some(creator)).await
    }

    pub async fn unregister(&self) -> Result<RegistrationReport> {
        self.each_repo(Mode::Unregister, None).await
    }

    async fn each_repo(
        &self,
        mode: Mode,
        creator: Option<Arc<Creator>>,
    ) -> Result<RegistrationReport> {
        let tally = Arc::new(Tally::default());
        let pool = AsyncPool::new(self.concurrency);
        let workspaces = workspace_slugs(&fetch_workspaces(&self.api).await?);
        for workspace in &workspaces {
            for repo in fetch_repos(&self.api, workspace, None).await? {
                tally.repos.fetch_add(1, Ordering::SeqCst);
                let api = Arc::clone(&self.api);
                let tally = Arc::clone(&tally);
                let creator = creator.clone();
                pool.submit(async move {
                    let result = match (mode, creator) {
                        (Mode::Register, Some(creator)) => install(&api, &repo, &creator).await,
                        _ => remove(&api, &repo).await,
                    };
                    match result {
                        Ok(outcome) => {
                            info!(
                                repo = %repo.full_name,
                                outcome = outcome.as_str(),
                                "webhooks reconciled"
                            );
                            tally.bump(outcome);
                        }
                        Err(err) => {
                            warn!(
                                repo = %repo.full_name,
                                error = ?err,
                                "webhook reconciliation failed"
                            );
                            tally.bump(Outcome::Failed);
                        }
                    }
                    Ok(())
                });
            }
        }
        pool.wait().await?;
        let report = tally.report();
        info!(
            repos = report.repos,
            installed = report.installed,
            up_to_date = report.up_to_date,
            removed = report.removed,
            failed = report.failed,
            "webhook reconciliation finished"
        );
        Ok(report)
    }
}

struct Creator {
    callback: Url,
    user_uuid: String,
}

impl Creator {
    fn hook_for(&self, repo: &RepoPayload, event: WebhookEvent) -> HookCreatePayload {
        HookCreatePayload {
            active: true,
            creator_id: format!("user:{}", self.user_uuid),
            description: WEBHOOK_DESCRIPTION.to_string(),
            events: vec![event.as_str().to_string()],
            subject_key: format!("repository:{}", repo.uuid),
            url: delivery_url(&self.callback, event),
        }
    }
}

pub fn delivery_url(callback: &Url, event: WebhookEvent) -> String {
    let mut url = callback.clone();
    url.query_pairs_mut()
        .append_pair("version", WEBHOOK_VERSION)
        .append_pair("event", event.as_str());
    url.to_string()
}

fn ours(hooks: Vec<HookPayload>) -> Vec<HookPayload> {
    hooks
        .into_iter()
        .filter(|hook| hook.description == WEBHOOK_DESCRIPTION)
        .collect()
}

fn hook_version(hook: &HookPayload) -> Option<String> {
    let url = Url::parse(&hook.url).ok()?;
    let version = url
        .query_pairs()
        .find(|(key, _)| key == "version")
        .map(|(_, value)| value.into_owned());
    version
}

/// Our hooks are current when every one carries the current version and
/// together they subscribe to every event.
pub fn hooks_up_to_date(hooks: &[HookPayload]) -> bool {
    if hooks.is_empty() {
        return false;
    }
    if hooks
        .iter()
        .any(|hook| hook_version(hook).as_deref() != Some(WEBHOOK_VERSION))
    {
        return false;
    }
    let covered: HashSet<&str> = hooks
        .iter()
        .flat_map(|hook| hook.events.iter().map(String::as_str))
        .collect();
    WebhookEvent::ALL
        .iter()
        .all(|event| covered.contains(event.as_str()))
}

async fn install(
    api: &Arc<dyn BitbucketApi>,
    repo: &RepoPayload,
    creator: &Creator,
) -> Result<Outcome> {
    let existing = ours(list_hooks(api, &repo.full_name).await?);
    if hooks_up_to_date(&existing) {
        return Ok(Outcome::UpToDate);
    }
    for hook in &existing {
        delete_hook(api.as_ref(), &repo.full_name, &hook.uuid).await?;
    }
    for event in WebhookEvent::ALL {
        create_hook(api.as_ref(), &repo.full_name, &creator.hook_for(repo, event)).await?;
    }
    Ok(Outcome::Installed)
}

async fn remove(api: &Arc<dyn BitbucketApi>, repo: &RepoPayload) -> Result<Outcome> {
    for hook in ours(list_hooks(api, &repo.full_name).await?) {
        delete_hook(api.as_ref(), &repo.full_name, &hook.uuid).await?;
    }
    Ok(Outcome::Removed)
}
