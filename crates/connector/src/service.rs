use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use common::config::ConnectorConfig;
use normalizer::models::RepoAffiliation;
use normalizer::payloads::RepoPayload;
use normalizer::{convert_repo, ConvertContext, RecordKind};
use store::{Pipe, StateStore};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use crate::async_pool::{AsyncPool, ErrorSlot};
use crate::client::{ApiEnv, BitbucketApi};
use crate::emitter::Emitter;
use crate::fetcher::{
    fetch_pull_requests, fetch_users, fetch_workspaces, repos_paginator, workspace_slugs,
};
use crate::metrics::{self, ActiveRepoGuard};
use crate::repo_filter::RepoFilter;

/// State key of the sync watermark.
pub const WATERMARK_KEY: &str = "updated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    pub slug: String,
    pub affiliation: RepoAffiliation,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub workspaces: usize,
    pub repos: usize,
    pub written: BTreeMap<RecordKind, usize>,
    pub watermark: DateTime<Utc>,
}

impl ExportReport {
    pub fn total_written(&self) -> usize {
        self.written.values().sum()
    }
}

/// Drives full and incremental export passes.
pub struct Exporter {
    config: ConnectorConfig,
    api: Arc<dyn BitbucketApi>,
    state: Arc<dyn StateStore>,
    pipe: Arc<dyn Pipe>,
    filter: RepoFilter,
    ctx: ConvertContext,
}

impl Exporter {
    pub fn new(
        config: ConnectorConfig,
        api: Arc<dyn BitbucketApi>,
        state: Arc<dyn StateStore>,
        pipe: Arc<dyn Pipe>,
    ) -> Result<Self> {
        let filter = RepoFilter::new(&config.inclusions, &config.exclusions)?;
        let ctx = ConvertContext::from(&config);
        Ok(Self {
            config,
            api,
            state,
            pipe,
            filter,
            ctx,
        })
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            self.run_once().await?;
            if self.config.run_once {
                break;
            }
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(customer = %self.ctx.customer_id))]
    pub async fn run_once(&self) -> Result<ExportReport> {
        let run_started = Utc::now();
        metrics::RUNS_TOTAL.inc();
        metrics::LAST_RUN_TIMESTAMP.set(run_started.timestamp());
        let _timer = metrics::RUN_DURATION.start_timer();

        match self.export().await {
            Ok(report) => {
                metrics::RUN_SUCCESSES_TOTAL.inc();
                metrics::LAST_SUCCESS_TIMESTAMP.set(Utc::now().timestamp());
                info!(
                    workspaces = report.workspaces,
                    repos = report.repos,
                    count = report.total_written(),
                    "export finished"
                );
                Ok(report)
            }
            Err(err) => {
                metrics::RUN_FAILURES_TOTAL.inc();
                error!(error = ?err, "export finished with error");
                Err(err)
            }
        }
    }

    async fn export(&self) -> Result<ExportReport> {
        let cutoff = if self.config.historical {
            None
        } else {
            read_watermark(self.state.as_ref()).await?
        };
        info!(since = ?cutoff, historical = self.config.historical, "export started");

        let (emitter, drains) = Emitter::spawn(Arc::clone(&self.pipe));
        let emitter = Arc::new(emitter);
        let env = ApiEnv {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
            ctx: self.ctx.clone(),
            sink: emitter.clone(),
            concurrency: self.config.concurrency,
        };

        let produced = self.produce(&env, cutoff).await;
        drop(env);
        emitter.close().await;
        let drained = drains.finish().await;

        let errors = ErrorSlot::new();
        let totals = match produced {
            Ok(totals) => Some(totals),
            Err(err) => {
                errors.record(err);
                None
            }
        };
        let written = match drained {
            Ok(written) => Some(written),
            Err(err) => {
                errors.record(err);
                None
            }
        };
        errors.into_result()?;
        let ((workspaces, repos), written) = totals.zip(written).unwrap_or_default();

        self.pipe.flush().await.context("flushing output")?;
        let watermark = Utc::now();
        self.state
            .set(WATERMARK_KEY, watermark.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .await
            .context("persisting sync watermark")?;

        Ok(ExportReport {
            workspaces,
            repos,
            written,
            watermark,
        })
    }

    async fn produce(
        &self,
        env: &ApiEnv,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<(usize, usize)> {
        let targets = self.resolve_workspaces().await?;
        let mut repos = 0;
        for target in &targets {
            repos += self.export_workspace(env, target, cutoff).await?;
        }
        Ok((targets.len(), repos))
    }

    /// The account's own workspaces plus configured third-party accounts.
    pub async fn resolve_workspaces(&self) -> Result<Vec<WorkspaceTarget>> {
        let own = workspace_slugs(&fetch_workspaces(&self.api).await?);
        if self.config.accounts.is_empty() {
            info!("no accounts configured, exporting the account's own workspaces");
        }
        Ok(plan_workspaces(own, &self.config.accounts))
    }

    #[instrument(skip(self, env, target), fields(workspace = %target.slug))]
    async fn export_workspace(
        &self,
        env: &ApiEnv,
        target: &WorkspaceTarget,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let pool = AsyncPool::new(self.config.concurrency);
        let listed = match self.submit_repos(&pool, env, target, cutoff).await {
            Ok(count) => fetch_users(env, &target.slug).await.map(|_| count),
            Err(err) => Err(err),
        };
        // Queued pipelines finish before a listing error is returned.
        let drained = pool.wait().await;
        let count = listed?;
        drained?;
        debug!(count, "finished sending repos");
        Ok(count)
    }

    async fn submit_repos(
        &self,
        pool: &AsyncPool,
        env: &ApiEnv,
        target: &WorkspaceTarget,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let mut pager = repos_paginator(&self.api, &target.slug, cutoff);
        let mut count = 0;
        while let Some(page) = pager.next_page::<RepoPayload>().await? {
            for repo in page {
                if !self.filter.allows(&repo.full_name) {
                    debug!(repo = %repo.full_name, "repository filtered out");
                    continue;
                }
                env.sink
                    .emit(convert_repo(&env.ctx, &repo, target.affiliation).into())
                    .await?;
                count += 1;
                let env = env.clone();
                pool.submit(async move { export_repo(env, repo, cutoff).await });
            }
        }
        Ok(count)
    }
}

async fn export_repo(env: ApiEnv, repo: RepoPayload, cutoff: Option<DateTime<Utc>>) -> Result<()> {
    let _active = ActiveRepoGuard::new();
    let started = Instant::now();
    let result = fetch_pull_requests(&env, &repo.full_name, &repo.uuid, cutoff).await;
    let outcome = if result.is_ok() { "success" } else { "error" };
    metrics::REPO_DURATION
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());
    result.map(|_| ())
}

/// Own workspaces are organisation-affiliated; configured accounts are
/// third-party even when the account is also a member.
pub fn plan_workspaces(own: Vec<String>, accounts: &[String]) -> Vec<WorkspaceTarget> {
    let mut targets: Vec<WorkspaceTarget> = Vec::with_capacity(own.len() + accounts.len());
    for slug in own.into_iter().chain(accounts.iter().cloned()) {
        let affiliation = if accounts.contains(&slug) {
            RepoAffiliation::ThirdParty
        } else {
            RepoAffiliation::Organization
        };
        if targets.iter().any(|target| target.slug == slug) {
            continue;
        }
        targets.push(WorkspaceTarget { slug, affiliation });
    }
    targets
}

pub async fn read_watermark(state: &dyn StateStore) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = state.get(WATERMARK_KEY).await? else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("invalid sync watermark {raw:?}"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}
