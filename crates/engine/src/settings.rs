//! Engine tunables.
//!
//! Loaded the same way the binaries load their own config: an optional TOML
//! file first, then `LEDGER_ENGINE__*` environment variables on top.

use std::time::Duration;

use serde::Deserialize;

use crate::storage::ValidationRules;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound for every wallet-authority call, in milliseconds.
    pub gateway_timeout_ms: u64,
    /// Upper bound for one object-store upload, in milliseconds.
    pub storage_timeout_ms: u64,
    /// How many times a whole operation is retried after a version conflict
    /// that happened before any wallet mutation.
    pub max_conflict_retries: u32,
    pub outbox_max_retries: i32,
    pub attachment_bucket: String,
    pub attachment_prefix: String,
    pub attachment_validation: ValidationRules,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gateway_timeout_ms: 10_000,
            storage_timeout_ms: 30_000,
            max_conflict_retries: 3,
            outbox_max_retries: 5,
            attachment_bucket: "transaction-attachments".to_string(),
            attachment_prefix: "transaction_attachment".to_string(),
            attachment_validation: ValidationRules::default(),
        }
    }
}

impl EngineSettings {
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LEDGER_ENGINE")
                .prefix_separator("__")
                .separator("__"),
        );
        builder.build()?.try_deserialize()
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}
