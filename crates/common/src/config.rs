use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bitbucket: BitbucketConfig,
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("connector.accounts")
                    .with_list_parse_key("connector.inclusions")
                    .with_list_parse_key("connector.exclusions"),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketConfig {
    #[serde(default = "BitbucketConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "BitbucketConfig::default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl BitbucketConfig {
    fn default_base_url() -> String {
        "https://api.bitbucket.org/2.0".to_string()
    }

    fn default_user_agent() -> String {
        "bitbucket-connector".to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub basic: Option<BasicAuthConfig>,
    #[serde(default)]
    pub oauth2: Option<OAuth2Config>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "OAuth2Config::default_token_url")]
    pub token_url: String,
}

impl OAuth2Config {
    fn default_token_url() -> String {
        "https://bitbucket.org/site/oauth2/access_token".to_string()
    }
}

/// The authentication scheme picked from [`AuthConfig`]. Basic auth wins when
/// both are configured.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Basic(BasicAuthConfig),
    OAuth2(OAuth2Config),
}

impl AuthConfig {
    pub fn resolve(&self) -> Result<AuthMethod, AppError> {
        if let Some(basic) = &self.basic {
            return Ok(AuthMethod::Basic(basic.clone()));
        }
        if let Some(oauth) = &self.oauth2 {
            return Ok(AuthMethod::OAuth2(oauth.clone()));
        }
        Err(AppError::MissingAuth)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub customer_id: String,
    #[serde(default)]
    pub integration_instance_id: String,
    #[serde(default = "ConnectorConfig::default_ref_type")]
    pub ref_type: String,
    #[serde(default = "ConnectorConfig::default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub historical: bool,
    #[serde(default = "ConnectorConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "ConnectorConfig::default_run_once")]
    pub run_once: bool,
    /// Workspaces outside the authenticated user's membership; their
    /// repositories are tagged third-party.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl ConnectorConfig {
    fn default_ref_type() -> String {
        "bitbucket".to_string()
    }

    const fn default_concurrency() -> usize {
        10
    }

    const fn default_interval_secs() -> u64 {
        300
    }

    const fn default_run_once() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "BrokerConfig::default_max_inflight")]
    pub max_inflight: usize,
    #[serde(default = "BrokerConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "BrokerConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "BrokerConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "BrokerConfig::default_jitter_frac")]
    pub jitter_frac: f32,
    #[serde(default = "BrokerConfig::default_refresh_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_inflight: Self::default_max_inflight(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            jitter_frac: Self::default_jitter_frac(),
            refresh_cooldown_secs: Self::default_refresh_cooldown_secs(),
        }
    }
}

impl BrokerConfig {
    const fn default_max_inflight() -> usize {
        32
    }

    const fn default_max_attempts() -> u32 {
        5
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        60_000
    }

    const fn default_jitter_frac() -> f32 {
        0.2
    }

    const fn default_refresh_cooldown_secs() -> u64 {
        60
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub state_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

impl ApiConfig {
    fn default_bind() -> String {
        "0.0.0.0:8080".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "ObservabilityConfig::default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_path: Self::default_metrics_path(),
            log_level: Self::default_log_level(),
        }
    }
}

impl ObservabilityConfig {
    fn default_metrics_path() -> String {
        "/metrics".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_default(dir: &Path, body: &str) {
        let config_dir = dir.join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("default.toml"), body).unwrap();
    }

    #[test]
    fn loads_defaults_from_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        write_default(
            dir.path(),
            r#"
            [bitbucket.auth.basic]
            username = "bot"
            password = "secret"

            [connector]
            customer_id = "cust-1"
            "#,
        );

        let config = AppConfig::load_from_path(dir.path()).unwrap();
        assert_eq!(config.bitbucket.base_url, "https://api.bitbucket.org/2.0");
        assert_eq!(config.connector.ref_type, "bitbucket");
        assert_eq!(config.connector.concurrency, 10);
        assert!(config.connector.run_once);
        assert_eq!(config.broker.refresh_cooldown_secs, 60);
        assert_eq!(config.observability.metrics_path, "/metrics");
        assert!(matches!(
            config.bitbucket.auth.resolve().unwrap(),
            AuthMethod::Basic(_)
        ));
    }

    #[test]
    fn missing_auth_is_reported() {
        let auth = AuthConfig::default();
        assert!(matches!(auth.resolve(), Err(AppError::MissingAuth)));
    }

    #[test]
    fn basic_auth_wins_over_oauth() {
        let auth = AuthConfig {
            basic: Some(BasicAuthConfig {
                username: "u".into(),
                password: "p".into(),
            }),
            oauth2: Some(OAuth2Config {
                access_token: "a".into(),
                refresh_token: "r".into(),
                client_id: String::new(),
                client_secret: String::new(),
                token_url: OAuth2Config::default_token_url(),
            }),
        };
        assert!(matches!(auth.resolve().unwrap(), AuthMethod::Basic(_)));
    }
}
