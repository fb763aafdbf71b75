use http::StatusCode;
use thiserror::Error;

/// A Bitbucket response whose status the broker does not retry past.
#[derive(Debug, Error)]
#[error("bitbucket responded {status}{}", endpoint_suffix(.endpoint))]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub endpoint: String,
}

fn endpoint_suffix(endpoint: &str) -> String {
    if endpoint.is_empty() {
        String::new()
    } else {
        format!(" for {endpoint}")
    }
}

impl HttpStatusError {
    pub fn new(status: StatusCode) -> Self {
        Self::with_endpoint(status, String::new())
    }

    pub fn with_endpoint(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            endpoint: endpoint.into(),
        }
    }
}

pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HttpStatusError>())
        .map(|http| http.status)
}
