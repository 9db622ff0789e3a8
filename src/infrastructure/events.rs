use async_trait::async_trait;

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;

/// Publishes domain events as JSON on `<prefix>.<aggregate>.<event>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client, prefix: prefix.to_string() })
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = format!("{}.{}", self.prefix, event.subject());
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => { tracing::error!(%subject, error = %e, "failed to encode event"); continue; }
            };
            if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}

/// Fallback when no broker is configured: events only reach the log.
#[derive(Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            tracing::info!(subject = %event.subject(), ?event, "domain event");
        }
    }
}
