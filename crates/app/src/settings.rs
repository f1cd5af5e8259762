//! Daemon settings.
//!
//! Read from `config/ledgerd.toml` (optional), then `LEDGER__*` environment
//! variables, then command line flags.

use clap::Parser;
use config::{Config, Environment, File};
use engine::PublisherSettings;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Parser, Debug)]
#[command(name = "ledgerd")]
#[command(about = "Applies ledger migrations and relays the transaction outbox")]
pub struct Cli {
    /// Settings file, without extension.
    #[arg(long, env = "LEDGERD_CONFIG", default_value = "config/ledgerd")]
    pub config: String,

    /// Overrides `database.url`.
    #[arg(long)]
    pub database_url: Option<String>,

    /// Overrides `broker.url`.
    #[arg(long)]
    pub broker_url: Option<String>,

    /// Overrides `app.level`.
    #[arg(long)]
    pub level: Option<String>,

    /// Publish one batch and exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Broker {
    pub url: String,
    #[serde(default = "default_broker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_broker_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub database: Database,
    pub broker: Broker,
    #[serde(default)]
    pub publisher: PublisherSettings,
}

impl Settings {
    pub fn new(cli: &Cli) -> Result<Self, AppError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&cli.config).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__"),
            );
        if let Some(url) = &cli.database_url {
            builder = builder.set_override("database.url", url.as_str())?;
        }
        if let Some(url) = &cli.broker_url {
            builder = builder.set_override("broker.url", url.as_str())?;
        }
        if let Some(level) = &cli.level {
            builder = builder.set_override("app.level", level.as_str())?;
        }
        Ok(builder.build()?.try_deserialize()?)
    }
}
