use std::time::Duration;

use clap::Parser;
use engine::OutboxPublisher;
use migration::{Migrator, MigratorTrait};

use crate::{broker::WebhookBroker, error::AppError, settings::Settings};

mod broker;
mod error;
mod settings;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = settings::Cli::parse();
    let settings = Settings::new(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledgerd={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let database = sea_orm::Database::connect(&settings.database.url).await?;
    Migrator::up(&database, None).await?;
    tracing::info!("ledger schema up to date");

    let broker = WebhookBroker::new(
        settings.broker.url.clone(),
        Duration::from_millis(settings.broker.timeout_ms),
    )?;
    let publisher = OutboxPublisher::new(database, broker, settings.publisher);

    if cli.once {
        let report = publisher.publish_pending().await?;
        tracing::info!(
            published = report.published,
            failed = report.failed,
            exhausted = report.exhausted,
            "outbox batch done"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let relay = tokio::spawn(async move { publisher.run(shutdown_rx).await });

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(err) = relay.await {
        tracing::error!("outbox relay task failed: {err}");
    }

    Ok(())
}
