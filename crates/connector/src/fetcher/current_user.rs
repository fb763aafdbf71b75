use anyhow::{Context, Result};
use normalizer::payloads::CurrentUserPayload;

use crate::client::{get_json, BitbucketApi};

pub async fn fetch_current_user(api: &dyn BitbucketApi) -> Result<CurrentUserPayload> {
    get_json(api, "user", &[])
        .await
        .context("fetching current user")
}
