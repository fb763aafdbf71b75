use std::time::Instant;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

pub static RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "connector_export_runs_total",
        "Total number of export passes attempted"
    )
    .expect("connector runs total")
});

pub static RUN_SUCCESSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "connector_export_success_total",
        "Export passes that completed and advanced the watermark"
    )
    .expect("connector run successes")
});

pub static RUN_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "connector_export_failure_total",
        "Export passes that failed without advancing the watermark"
    )
    .expect("connector run failures")
});

pub static LAST_RUN_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "connector_last_run_timestamp_seconds",
        "Unix timestamp when the export pass last started"
    )
    .expect("connector last run timestamp")
});

pub static LAST_SUCCESS_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "connector_last_success_timestamp_seconds",
        "Unix timestamp when an export pass last completed"
    )
    .expect("connector last success timestamp")
});

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "connector_export_duration_seconds",
        "Duration of export passes in seconds",
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]
    )
    .expect("connector run duration histogram")
});

pub static ACTIVE_REPOS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "connector_active_repositories",
        "Number of repositories whose pull requests are currently being exported"
    )
    .expect("connector active repositories gauge")
});

pub static REPO_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "connector_repository_duration_seconds",
        "Duration spent exporting a repository's pull requests grouped by outcome",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("connector repository duration histogram")
});

pub static RECORDS_WRITTEN_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "connector_records_written_total",
        "Records written to the output pipe grouped by kind",
        &["kind"]
    )
    .expect("connector records written")
});

// Expected-absence responses (404 commits, 403 members) treated as empty.
pub static ABSENCE_SKIPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "connector_absence_skips_total",
        "Sub-resource fetches treated as empty after a 403/404 grouped by resource",
        &["resource"]
    )
    .expect("connector absence skips")
});

pub static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "connector_webhook_events_total",
        "Inbound webhook deliveries grouped by event name and outcome",
        &["event", "outcome"]
    )
    .expect("connector webhook events")
});

pub static WEBHOOK_REGISTRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "connector_webhook_registrations_total",
        "Repository webhook (de)registrations grouped by outcome",
        &["outcome"]
    )
    .expect("connector webhook registrations")
});

pub struct ActiveRepoGuard;

impl Default for ActiveRepoGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRepoGuard {
    pub fn new() -> Self {
        ACTIVE_REPOS.inc();
        Self
    }
}

impl Drop for ActiveRepoGuard {
    fn drop(&mut self) {
        ACTIVE_REPOS.dec();
    }
}

pub static FETCH_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "connector_fetch_requests_total",
        "Resource fetches grouped by resource and outcome",
        &["resource", "outcome"]
    )
    .expect("connector fetch requests")
});

pub static FETCH_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "connector_fetch_latency_seconds",
        "Latency of resource fetches including pagination",
        &["resource"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("connector fetch latency histogram")
});

pub fn observe_fetch<T>(resource: &str, start: Instant, result: &anyhow::Result<T>) {
    let outcome = if result.is_ok() { "success" } else { "error" };
    FETCH_REQUESTS_TOTAL
        .with_label_values(&[resource, outcome])
        .inc();
    FETCH_LATENCY_SECONDS
        .with_label_values(&[resource])
        .observe(start.elapsed().as_secs_f64());
}
