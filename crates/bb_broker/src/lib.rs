pub mod backoff;
pub mod broker;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod model;

pub use broker::{BitbucketBroker, BitbucketBrokerBuilder, HttpExec, ReqwestExecutor};
pub use credentials::{Credentials, OAuthTokenRefresher, RefreshPolicy, TokenRefresher};
pub use error::HttpStatusError;
