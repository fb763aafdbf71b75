#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use connector::client::{ApiEnv, BitbucketApi, BitbucketApiError};
use connector::emitter::DirectSink;
use http::StatusCode;
use normalizer::ConvertContext;
use serde_json::{json, Value};
use store::{MemoryPipe, MemoryState};

pub const BASE: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

enum Route {
    Pages(Vec<Vec<Value>>),
    Object(Value),
    Status(StatusCode),
}

/// In-memory Bitbucket serving canned pages keyed by endpoint.
#[derive(Default)]
pub struct FakeBitbucket {
    routes: Mutex<HashMap<String, Route>>,
    post_status: Mutex<HashMap<String, StatusCode>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBitbucket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pages(&self, endpoint: &str, pages: Vec<Vec<Value>>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Route::Pages(pages));
        self
    }

    pub fn values(&self, endpoint: &str, values: Vec<Value>) -> &Self {
        self.pages(endpoint, vec![values])
    }

    pub fn object(&self, endpoint: &str, value: Value) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Route::Object(value));
        self
    }

    pub fn status(&self, endpoint: &str, status: StatusCode) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Route::Status(status));
        self
    }

    pub fn fail_posts(&self, endpoint: &str, status: StatusCode) -> &Self {
        self.post_status
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn gets(&self, endpoint: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == "GET" && call.endpoint == endpoint)
            .collect()
    }

    pub fn calls_with(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    fn record(
        &self,
        method: &'static str,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) {
        self.calls.lock().unwrap().push(Call {
            method,
            endpoint: endpoint.to_string(),
            query: query.to_vec(),
            body,
        });
    }
}

#[async_trait]
impl BitbucketApi for FakeBitbucket {
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Vec<u8>> {
        self.record("GET", endpoint, query, None);
        let routes = self.routes.lock().unwrap();
        let body = match routes.get(endpoint) {
            None => return Err(BitbucketApiError::status(StatusCode::NOT_FOUND, endpoint).into()),
            Some(Route::Status(status)) => {
                return Err(BitbucketApiError::status(*status, endpoint).into())
            }
            Some(Route::Object(value)) => value.clone(),
            Some(Route::Pages(pages)) => {
                let pagelen_only = query.iter().any(|(k, v)| k == "pagelen" && v == "0");
                let page: usize = query
                    .iter()
                    .find(|(k, _)| k == "page")
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(1);
                let size: usize = pages.iter().map(Vec::len).sum();
                if pagelen_only {
                    json!({ "size": size, "values": [] })
                } else {
                    let values = pages.get(page - 1).cloned().unwrap_or_default();
                    let mut envelope = json!({ "page": page, "size": size, "values": values });
                    if page < pages.len() {
                        envelope["next"] = json!(format!("{BASE}/{endpoint}?page={}", page + 1));
                    }
                    envelope
                }
            }
        };
        Ok(serde_json::to_vec(&body)?)
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let value: Value = serde_json::from_slice(&body)?;
        self.record("POST", endpoint, &[], Some(value.clone()));
        if let Some(status) = self.post_status.lock().unwrap().get(endpoint) {
            return Err(BitbucketApiError::status(*status, endpoint).into());
        }
        let mut created = value;
        created["uuid"] = json!(format!("{{created-{}}}", self.calls.lock().unwrap().len()));
        Ok(serde_json::to_vec(&created)?)
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        self.record("DELETE", endpoint, &[], None);
        Ok(())
    }
}

pub fn ctx() -> ConvertContext {
    ConvertContext::new("cust-1", "inst-1", "bitbucket")
}

pub struct Harness {
    pub fake: Arc<FakeBitbucket>,
    pub state: Arc<MemoryState>,
    pub pipe: Arc<MemoryPipe>,
    pub env: ApiEnv,
}

/// Fetcher environment writing straight into a memory pipe.
pub fn harness(fake: Arc<FakeBitbucket>) -> Harness {
    let state = Arc::new(MemoryState::new());
    let pipe = Arc::new(MemoryPipe::new());
    let env = ApiEnv {
        api: fake.clone(),
        state: state.clone(),
        ctx: ctx(),
        sink: Arc::new(DirectSink::new(pipe.clone())),
        concurrency: 4,
    };
    Harness {
        fake,
        state,
        pipe,
        env,
    }
}

pub fn account(account_id: &str, name: &str) -> Value {
    json!({
        "account_id": account_id,
        "uuid": format!("{{{account_id}-uuid}}"),
        "display_name": name,
        "nickname": name.to_lowercase(),
        "type": "user",
        "links": {
            "html": { "href": format!("https://bitbucket.org/{account_id}") },
            "avatar": { "href": format!("https://avatars.example.com/{account_id}.png") }
        }
    })
}

pub fn repo(workspace: &str, slug: &str, uuid: &str) -> Value {
    json!({
        "uuid": uuid,
        "name": slug,
        "full_name": format!("{workspace}/{slug}"),
        "description": "Widgets service",
        "language": "rust",
        "is_private": true,
        "mainbranch": { "name": "main" },
        "links": { "html": { "href": format!("https://bitbucket.org/{workspace}/{slug}") } },
        "workspace": { "slug": workspace, "name": workspace, "uuid": format!("{{{workspace}}}") },
        "created_on": "2023-01-01T00:00:00Z",
        "updated_on": "2024-05-01T09:00:00Z"
    })
}

pub fn pull_request(id: i64, state: &str, updated_on: &str, participants: Vec<Value>) -> Value {
    json!({
        "id": id,
        "title": format!("Change {id}"),
        "description": "Adds **bold** support",
        "state": state,
        "author": account("acc-author", "Author"),
        "participants": participants,
        "source": { "branch": { "name": format!("feature/{id}") } },
        "destination": { "branch": { "name": "main" } },
        "links": { "html": { "href": format!("https://bitbucket.org/acme/widgets/pull-requests/{id}") } },
        "created_on": "2024-04-30T08:00:00Z",
        "updated_on": updated_on
    })
}

pub fn reviewer(account_id: &str, approved: bool, participated_on: Option<&str>) -> Value {
    json!({
        "role": "REVIEWER",
        "approved": approved,
        "participated_on": participated_on,
        "user": account(account_id, account_id)
    })
}

pub fn commit(hash: &str, date: &str) -> Value {
    json!({
        "hash": hash,
        "message": format!("commit {hash}"),
        "date": date,
        "author": { "raw": "Dev <dev@example.com>", "user": account("acc-dev", "Dev") },
        "links": { "html": { "href": format!("https://bitbucket.org/acme/widgets/commits/{hash}") } }
    })
}

pub fn comment(id: i64, body: &str) -> Value {
    json!({
        "id": id,
        "content": { "raw": body },
        "user": account("acc-reviewer", "Reviewer"),
        "links": { "html": { "href": format!("https://bitbucket.org/acme/widgets/pull-requests/1#comment-{id}") } },
        "created_on": "2024-04-30T09:00:00Z",
        "updated_on": "2024-04-30T09:30:00Z"
    })
}
