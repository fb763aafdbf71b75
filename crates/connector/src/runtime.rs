use std::sync::Arc;

use anyhow::Result;
use bb_broker::{BitbucketBrokerBuilder, Credentials, OAuthTokenRefresher};
use common::config::{AppConfig, AuthMethod, StoreConfig};
use common::AppError;
use store::{FileState, JsonLinesPipe, MemoryState, Pipe, StateStore};
use tracing::{info, warn};

use crate::client::{BitbucketApi, BrokerBitbucketClient};

/// Builds the authenticated Bitbucket client described by `config`.
pub fn build_api(config: &AppConfig) -> Result<Arc<dyn BitbucketApi>> {
    let mut builder = match config.bitbucket.auth.resolve()? {
        AuthMethod::Basic(basic) => {
            info!("using basic auth");
            BitbucketBrokerBuilder::new_with_config(
                Credentials::basic(basic.username, basic.password),
                &config.broker,
            )
        }
        AuthMethod::OAuth2(oauth) => {
            info!("using oauth2");
            let refresher = Arc::new(OAuthTokenRefresher::new(
                oauth.token_url,
                oauth.client_id,
                oauth.client_secret,
            ));
            BitbucketBrokerBuilder::new_with_config(
                Credentials::oauth2(oauth.access_token, oauth.refresh_token),
                &config.broker,
            )
            .refresher(refresher)
        }
    };
    builder = builder.user_agent(config.bitbucket.user_agent.clone());
    let broker = builder.build().map_err(AppError::http)?;
    Ok(Arc::new(BrokerBitbucketClient::new(
        broker,
        &config.bitbucket.base_url,
    )?))
}

pub async fn open_state(config: &StoreConfig) -> Result<Arc<dyn StateStore>> {
    match config.state_path.as_deref() {
        Some(path) => {
            let state = FileState::open(path).await.map_err(AppError::state)?;
            Ok(Arc::new(state))
        }
        None => {
            warn!("store.state_path not set, sync state will not survive restarts");
            Ok(Arc::new(MemoryState::new()))
        }
    }
}

pub async fn open_pipe(config: &StoreConfig) -> Result<Arc<dyn Pipe>> {
    match config.output_path.as_deref() {
        Some(path) => {
            let pipe = JsonLinesPipe::create(path).await.map_err(AppError::sink)?;
            Ok(Arc::new(pipe))
        }
        None => Ok(Arc::new(JsonLinesPipe::stdout())),
    }
}
