pub mod accounts;
pub mod async_pool;
pub mod client;
pub mod emitter;
pub mod fetcher;
pub mod metrics;
pub mod paginator;
pub mod registration;
pub mod repo_filter;
pub mod runtime;
pub mod service;
pub mod webhook;

pub use async_pool::{AsyncPool, ErrorSlot};
pub use client::{ApiEnv, BitbucketApi, BitbucketApiError, BrokerBitbucketClient};
pub use emitter::{DirectSink, Emitter, RecordSink};
pub use paginator::Paginator;
pub use registration::{RegistrationReport, WebhookRegistrar};
pub use service::{ExportReport, Exporter};
pub use webhook::{WebhookDispatcher, WebhookError, WebhookEvent};
