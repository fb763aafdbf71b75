use std::sync::Arc;

use anyhow::Result;
use api::{build_router, ApiState};
use axum::Router;
use common::{config::AppConfig, logging};
use connector::runtime::{build_api, open_pipe, open_state};
use connector::WebhookDispatcher;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_logging(&config.observability.log_level);
    let bitbucket = build_api(&config)?;
    let state = open_state(&config.store).await?;
    let pipe = open_pipe(&config.store).await?;
    let dispatcher = Arc::new(WebhookDispatcher::new(
        &config.connector,
        bitbucket,
        state,
        pipe.clone(),
    ));
    let metrics_path: &'static str =
        Box::leak(config.observability.metrics_path.clone().into_boxed_str());
    let app: Router = build_router(Arc::new(ApiState {
        dispatcher,
        metrics_path,
    }));

    let addr: std::net::SocketAddr = config.api.bind.parse()?;
    info!("api listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    pipe.close().await?;
    Ok(())
}
