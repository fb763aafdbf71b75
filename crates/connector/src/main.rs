use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{config::AppConfig, logging};
use connector::accounts::discover_accounts;
use connector::runtime::{build_api, open_pipe, open_state};
use connector::{Exporter, WebhookRegistrar};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "connector", about = "Exports Bitbucket Cloud source-code data")]
struct Cli {
    /// Directory holding config/default.* and config/local.*
    #[arg(long, default_value = ".")]
    config_dir: String,
    /// Ignore the sync watermark and export everything
    #[arg(long)]
    historical: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run export passes (the default)
    Export,
    /// Install repository webhooks pointing at webhook.callback_url
    RegisterWebhooks,
    /// Remove the connector's repository webhooks
    UnregisterWebhooks,
    /// Check credentials and list the exportable accounts
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from_path(&cli.config_dir)?;
    logging::init_logging(&config.observability.log_level);
    if cli.historical {
        config.connector.historical = true;
    }
    let api = build_api(&config)?;

    match cli.command.unwrap_or(Command::Export) {
        Command::Export => {
            let state = open_state(&config.store).await?;
            let pipe = open_pipe(&config.store).await?;
            let exporter = Exporter::new(config.connector.clone(), api, state, pipe.clone())?;
            info!(
                interval = config.connector.interval_secs,
                run_once = config.connector.run_once,
                "connector started"
            );
            let result = exporter.run().await;
            pipe.close().await?;
            result?;
        }
        Command::RegisterWebhooks => {
            let registrar = WebhookRegistrar::new(
                api,
                config.webhook.callback_url.clone(),
                config.connector.concurrency,
            );
            let report = registrar.register().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::UnregisterWebhooks => {
            let registrar = WebhookRegistrar::new(api, None, config.connector.concurrency);
            let report = registrar.unregister().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Validate => {
            let accounts = discover_accounts(&api).await?;
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
    }
    Ok(())
}
