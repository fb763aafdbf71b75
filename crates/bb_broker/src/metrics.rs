use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bb_broker_requests_total",
        "Bitbucket API requests grouped by method and response status class",
        &["method", "status"]
    )
    .expect("requests metric")
});

pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bb_broker_retries_total",
        "Retried Bitbucket API requests grouped by reason",
        &["reason"]
    )
    .expect("retries metric")
});

pub static REFRESHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bb_broker_credential_refreshes_total",
        "OAuth2 access token refresh attempts grouped by outcome",
        &["outcome"]
    )
    .expect("refreshes metric")
});

pub static UNAUTHORIZED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bb_broker_unauthorized_total",
        "Requests that ended with a 401 after any refresh attempt"
    )
    .expect("unauthorized metric")
});

pub static INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("bb_broker_inflight", "Inflight Bitbucket API requests")
        .expect("inflight metric")
});

pub static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "bb_broker_request_latency_seconds",
        "Latency of Bitbucket API requests",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("latency metric")
});
