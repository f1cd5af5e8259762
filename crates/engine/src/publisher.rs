//! Outbox relay.
//!
//! Reads unpublished outbox rows on a fixed tick and hands them to a
//! [`Broker`]. Delivery is at least once: a row is marked published only
//! after the broker accepted it, so a crash in between publishes it again.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tokio::sync::watch;

use crate::{OutboxMessage, ResultEngine, outbox};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BrokerError(pub String);

/// Message transport the outbox drains into.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), BrokerError>;
}

#[async_trait]
impl<B: Broker + ?Sized> Broker for Arc<B> {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), BrokerError> {
        self.as_ref().publish(message).await
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub batch_size: u64,
    pub interval_ms: u64,
    /// Published rows older than this are purged.
    pub retention_hours: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval_ms: 5_000,
            retention_hours: 24 * 7,
            cleanup_interval_secs: 3_600,
        }
    }
}

impl PublisherSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3_600)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Outcome of one [`OutboxPublisher::publish_pending`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
    /// Messages that used their last retry in this pass.
    pub exhausted: usize,
}

pub struct OutboxPublisher<B> {
    database: DatabaseConnection,
    broker: B,
    settings: PublisherSettings,
}

impl<B: Broker> OutboxPublisher<B> {
    pub fn new(database: DatabaseConnection, broker: B, settings: PublisherSettings) -> Self {
        Self {
            database,
            broker,
            settings,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Publish one batch of pending messages, oldest first.
    pub async fn publish_pending(&self) -> ResultEngine<PublishReport> {
        let batch = outbox::pending(&self.database, self.settings.batch_size).await?;
        let mut report = PublishReport::default();

        for message in &batch {
            match self.broker.publish(message).await {
                Ok(()) => {
                    outbox::mark_published(&self.database, message.id).await?;
                    report.published += 1;
                    tracing::debug!(
                        message_id = %message.id,
                        event_type = message.event_type.as_str(),
                        aggregate_id = %message.aggregate_id,
                        "outbox message published"
                    );
                }
                Err(err) => {
                    let retry_count =
                        outbox::record_failure(&self.database, message.id, &err.to_string())
                            .await?;
                    report.failed += 1;
                    if retry_count >= message.max_retries {
                        report.exhausted += 1;
                        tracing::error!(
                            message_id = %message.id,
                            event_type = message.event_type.as_str(),
                            aggregate_id = %message.aggregate_id,
                            retry_count,
                            "outbox_message_max_retries_exceeded: {err}"
                        );
                    } else {
                        tracing::warn!(
                            message_id = %message.id,
                            retry_count,
                            "outbox publish failed: {err}"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    /// Delete published messages older than `older_than`.
    pub async fn purge_published(&self, older_than: Duration) -> ResultEngine<u64> {
        let older_than = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let before = Utc::now()
            .checked_sub_signed(older_than)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let purged = outbox::purge_published(&self.database, before).await?;
        if purged > 0 {
            tracing::info!(purged, "published outbox messages purged");
        }
        Ok(purged)
    }

    /// Publish on every tick and purge on every cleanup tick until `shutdown`
    /// turns true or its sender goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut publish_tick = tokio::time::interval(self.settings.interval());
        let mut cleanup_tick = tokio::time::interval(self.settings.cleanup_interval());
        publish_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        cleanup_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.settings.batch_size,
            interval_ms = self.settings.interval_ms,
            "outbox publisher started"
        );
        loop {
            tokio::select! {
                _ = publish_tick.tick() => {
                    if let Err(err) = self.publish_pending().await {
                        tracing::error!("outbox publish pass failed: {err}");
                    }
                }
                _ = cleanup_tick.tick() => {
                    if let Err(err) = self.purge_published(self.settings.retention()).await {
                        tracing::error!("outbox purge failed: {err}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("outbox publisher stopped");
    }
}
