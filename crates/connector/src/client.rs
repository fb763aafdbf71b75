use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bb_broker::{BitbucketBroker, HttpStatusError};
use http::{header, Method, Request, StatusCode};
use normalizer::ConvertContext;
use serde::de::DeserializeOwned;
use store::StateStore;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::emitter::RecordSink;

#[derive(Debug, Error)]
pub enum BitbucketApiError {
    #[error("bitbucket api error: {status} for {endpoint}")]
    Http {
        status: StatusCode,
        endpoint: String,
    },
    #[error("pagination link without a page parameter: {next}")]
    MalformedPaginationLink { next: String },
    #[error("decoding response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BitbucketApiError {
    pub fn status(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self::Http {
            status,
            endpoint: endpoint.into(),
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            BitbucketApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// HTTP status carried anywhere in the error chain, whether it came from the
/// client or straight from the broker.
pub fn api_status(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<BitbucketApiError>()
                .and_then(BitbucketApiError::status_code)
        })
        .or_else(|| bb_broker::error::status_of(err))
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    api_status(err) == Some(StatusCode::NOT_FOUND)
}

pub fn is_forbidden(err: &anyhow::Error) -> bool {
    api_status(err) == Some(StatusCode::FORBIDDEN)
}

pub type QueryParams = Vec<(String, String)>;

pub fn query<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> QueryParams {
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[async_trait]
pub trait BitbucketApi: Send + Sync {
    /// GETs `endpoint` relative to the API base. Repeated keys in `query` are
    /// sent as repeated parameters.
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Vec<u8>>;
    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>>;
    async fn delete(&self, endpoint: &str) -> Result<()>;
}

pub fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| {
        BitbucketApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        }
        .into()
    })
}

pub async fn get_json<T: DeserializeOwned>(
    api: &dyn BitbucketApi,
    endpoint: &str,
    query: &[(String, String)],
) -> Result<T> {
    let body = api.get(endpoint, query).await?;
    decode(endpoint, &body)
}

pub struct BrokerBitbucketClient {
    broker: Arc<dyn BitbucketBroker>,
    base: Url,
}

impl BrokerBitbucketClient {
    pub fn new(broker: Arc<dyn BitbucketBroker>, base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { broker, base })
    }

    fn join(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base.join(endpoint.trim_start_matches('/'))?)
    }

    fn with_query(url: &mut Url, params: &[(String, String)]) {
        if params.is_empty() {
            return;
        }
        let mut query_pairs = url.query_pairs_mut();
        for (key, val) in params {
            query_pairs.append_pair(key, val);
        }
    }

    #[instrument(skip(self, body), fields(method = %method, url = %url))]
    async fn execute(&self, method: Method, url: Url, body: Vec<u8>) -> Result<Vec<u8>> {
        let endpoint = url.path().to_string();
        let uri: http::Uri = url.as_str().parse()?;
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ACCEPT, "application/json");
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(body)?;

        debug!(endpoint = %endpoint, "dispatching bitbucket request");
        let response = match self.broker.send(request).await {
            Ok(resp) => resp,
            Err(err) => {
                if let Some(status_err) = err.downcast_ref::<HttpStatusError>() {
                    return Err(BitbucketApiError::status(status_err.status, endpoint).into());
                }
                return Err(err);
            }
        };
        let status = response.status();
        if status.is_success() {
            Ok(response.into_body())
        } else {
            Err(BitbucketApiError::status(status, endpoint).into())
        }
    }
}

#[async_trait]
impl BitbucketApi for BrokerBitbucketClient {
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Vec<u8>> {
        let mut url = self.join(endpoint)?;
        Self::with_query(&mut url, query);
        self.execute(Method::GET, url, Vec::new()).await
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = self.join(endpoint)?;
        self.execute(Method::POST, url, body).await
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        let url = self.join(endpoint)?;
        self.execute(Method::DELETE, url, Vec::new()).await?;
        Ok(())
    }
}

/// Everything a fetcher needs: the API, durable state, record identity, and
/// where converted records go.
#[derive(Clone)]
pub struct ApiEnv {
    pub api: Arc<dyn BitbucketApi>,
    pub state: Arc<dyn StateStore>,
    pub ctx: ConvertContext,
    pub sink: Arc<dyn RecordSink>,
    pub concurrency: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_found_through_context() {
        let err = anyhow::Error::from(BitbucketApiError::status(
            StatusCode::NOT_FOUND,
            "/2.0/repositories/acme/widgets/pullrequests/7/commits",
        ))
        .context("fetching commits");
        assert!(is_not_found(&err));
        assert!(!is_forbidden(&err));
    }

    #[test]
    fn broker_status_counts_as_api_status() {
        let err = anyhow::Error::from(HttpStatusError::new(StatusCode::FORBIDDEN));
        assert!(is_forbidden(&err));
    }

    #[test]
    fn base_url_keeps_its_version_segment() {
        struct Never;
        impl BitbucketBroker for Never {
            fn send(
                &self,
                _request: Request<Vec<u8>>,
            ) -> futures::future::BoxFuture<'static, Result<http::Response<Vec<u8>>>> {
                Box::pin(async { Err(anyhow::anyhow!("unused")) })
            }
        }
        let client = BrokerBitbucketClient::new(Arc::new(Never), "https://api.bitbucket.org/2.0")
            .unwrap();
        let url = client.join("/repositories/acme/widgets").unwrap();
        assert_eq!(url.as_str(), "https://api.bitbucket.org/2.0/repositories/acme/widgets");

        let mut url = client.join("repositories/acme/widgets/pullrequests").unwrap();
        BrokerBitbucketClient::with_query(
            &mut url,
            &query([("state", "MERGED"), ("state", "OPEN")]),
        );
        assert_eq!(url.query(), Some("state=MERGED&state=OPEN"));
    }
}
