use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Credentials attached to every outbound request.
#[derive(Debug)]
pub enum Credentials {
    Basic { username: String, password: String },
    OAuth2(OAuth2Credentials),
}

#[derive(Debug)]
pub struct OAuth2Credentials {
    access_token: RwLock<String>,
    refresh_token: String,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn oauth2(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::OAuth2(OAuth2Credentials {
            access_token: RwLock::new(access_token.into()),
            refresh_token: refresh_token.into(),
        })
    }

    pub async fn authorization(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                format!("Basic {encoded}")
            }
            Credentials::OAuth2(oauth) => {
                let token = oauth.access_token.read().await;
                format!("Bearer {}", *token)
            }
        }
    }

    pub fn is_refreshable(&self) -> bool {
        matches!(self, Credentials::OAuth2(_))
    }

    /// Swaps in a fresh access token obtained from `refresher`.
    pub async fn refresh(&self, refresher: &dyn TokenRefresher) -> Result<()> {
        let Credentials::OAuth2(oauth) = self else {
            return Err(anyhow!("basic credentials cannot be refreshed"));
        };
        let token = refresher.refresh(&oauth.refresh_token).await?;
        *oauth.access_token.write().await = token;
        Ok(())
    }
}

/// Rate-limits credential refreshes: at most one attempt per cool-down window.
#[derive(Debug)]
pub struct RefreshPolicy {
    cooldown: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl RefreshPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Claims the refresh slot if the previous attempt is older than the
    /// cool-down. Returns `false` while the window is still open.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<String>;
}

/// Refreshes OAuth2 access tokens against the Bitbucket token endpoint.
pub struct OAuthTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthTokenRefresher {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        debug!(token_url = %self.token_url, "refreshing oauth2 access token");
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("token refresh failed with status {status}"));
        }
        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }
}
