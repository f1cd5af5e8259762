//! Webhook broker: one JSON POST per outbox message.

use std::time::Duration;

use async_trait::async_trait;
use engine::{Broker, BrokerError, OutboxMessage};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
struct Envelope<'a> {
    id: String,
    event_type: &'a str,
    aggregate_id: String,
    occurred_at: String,
    payload: serde_json::Value,
}

pub struct WebhookBroker {
    client: reqwest::Client,
    url: String,
}

impl WebhookBroker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Broker for WebhookBroker {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), BrokerError> {
        let payload = serde_json::from_slice(&message.payload)
            .map_err(|err| BrokerError(format!("payload is not JSON: {err}")))?;
        let envelope = Envelope {
            id: message.id.to_string(),
            event_type: message.event_type.as_str(),
            aggregate_id: message.aggregate_id.to_string(),
            occurred_at: message.created_at.to_rfc3339(),
            payload,
        };
        let response = self
            .client
            .post(&self.url)
            .header("x-event-type", message.event_type.as_str())
            .header("x-message-id", message.id.to_string())
            .json(&envelope)
            .send()
            .await
            .map_err(|err| BrokerError(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BrokerError(format!("webhook answered {status}")))
        }
    }
}
