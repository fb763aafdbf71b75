use std::sync::Arc;

use anyhow::Result;
use normalizer::PageEnvelope;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::client::{decode, BitbucketApi, BitbucketApiError, QueryParams};

enum Cursor {
    Start,
    Page(String),
    Malformed(String),
    Done,
}

/// Walks a Bitbucket collection one page at a time. Only the `page` query
/// parameter changes between requests; the base parameters are resent as
/// given.
pub struct Paginator {
    api: Arc<dyn BitbucketApi>,
    endpoint: String,
    params: QueryParams,
    cursor: Cursor,
    pages: usize,
}

impl Paginator {
    pub fn new(api: Arc<dyn BitbucketApi>, endpoint: impl Into<String>, params: QueryParams) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            params,
            cursor: Cursor::Start,
            pages: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Returns the next batch of values, or `None` once the previous page had
    /// no `next` link. After any error the paginator is exhausted.
    pub async fn next_page<T: DeserializeOwned>(&mut self) -> Result<Option<Vec<T>>> {
        let page = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::Malformed(next) => {
                return Err(BitbucketApiError::MalformedPaginationLink { next }.into())
            }
            Cursor::Start => None,
            Cursor::Page(page) => Some(page),
        };

        let mut query = self.params.clone();
        if let Some(page) = page {
            query.retain(|(key, _)| key != "page");
            query.push(("page".to_string(), page));
        }

        let body = self.api.get(&self.endpoint, &query).await?;
        let envelope: PageEnvelope<T> = decode(&self.endpoint, &body)?;
        self.pages += 1;

        match envelope.next.as_deref().filter(|next| !next.is_empty()) {
            None => {
                debug!(endpoint = %self.endpoint, pages = self.pages, "pagination finished");
            }
            Some(next) => {
                self.cursor = match page_param(next) {
                    Some(page) => Cursor::Page(page),
                    None => Cursor::Malformed(next.to_string()),
                };
            }
        }
        Ok(Some(envelope.values))
    }

    /// Drains every remaining page into one vector.
    pub async fn collect_all<T: DeserializeOwned>(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(values) = self.next_page::<T>().await? {
            out.extend(values);
        }
        Ok(out)
    }
}

fn page_param(next: &str) -> Option<String> {
    let url = Url::parse(next).ok()?;
    let page = url
        .query_pairs()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())?;
    if page.is_empty() {
        None
    } else {
        Some(page)
    }
}

/// Reads the collection size without fetching any values.
pub async fn fetch_count(
    api: &dyn BitbucketApi,
    endpoint: &str,
    mut params: QueryParams,
) -> Result<i64> {
    params.retain(|(key, _)| key != "pagelen");
    params.push(("pagelen".to_string(), "0".to_string()));
    let body = api.get(endpoint, &params).await?;
    let envelope: PageEnvelope<serde_json::Value> = decode(endpoint, &body)?;
    Ok(envelope.size)
}
