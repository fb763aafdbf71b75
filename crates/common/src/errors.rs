pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("missing authentication: configure bitbucket.auth.basic or bitbucket.auth.oauth2")]
    MissingAuth,
    #[error("http error: {0}")]
    Http(#[source] anyhow::Error),
    #[error("state error: {0}")]
    State(#[source] anyhow::Error),
    #[error("sink error: {0}")]
    Sink(#[source] anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn http(err: impl Into<anyhow::Error>) -> Self {
        Self::Http(err.into())
    }

    pub fn state(err: impl Into<anyhow::Error>) -> Self {
        Self::State(err.into())
    }

    pub fn sink(err: impl Into<anyhow::Error>) -> Self {
        Self::Sink(err.into())
    }
}
