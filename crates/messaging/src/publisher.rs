//! Outbound publisher announcing local mutations to the broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::EventType;
use serde::Serialize;

use crate::envelope::{EventEnvelope, OrderPayload, SimplifiedOrder, encode};
use crate::error::{BusError, PublishError};
use crate::router::{DispatchReport, EventRouter};

/// Upper bound on a single publish, connection acquisition included.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that delivers encoded messages under a routing key.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send(&self, topic: &str, body: Vec<u8>) -> Result<(), BusError>;
}

/// Builds envelopes and hands them to a [`Broker`].
///
/// Every publish is independent: there is no ordering between calls and no retry.
/// Callers that have already committed local state log the returned error and
/// carry on.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publishes `payload` under the topic of `event_type`.
    #[tracing::instrument(skip(self, payload), fields(topic = %event_type))]
    pub async fn publish<P>(&self, event_type: EventType, payload: P) -> Result<(), PublishError>
    where
        P: Serialize + Send,
    {
        let envelope = EventEnvelope::new(event_type, payload);
        let body = encode(&envelope).inspect_err(|e| {
            tracing::error!(error = %e, "failed to encode event");
            metrics::counter!("events_publish_failed_total").increment(1);
        })?;

        let result = match tokio::time::timeout(
            self.timeout,
            self.broker.send(event_type.as_topic(), body),
        )
        .await
        {
            Ok(sent) => sent.map_err(PublishError::from),
            Err(_) => Err(PublishError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => {
                metrics::counter!("events_published_total").increment(1);
                tracing::info!("published event");
            }
            Err(e) => {
                metrics::counter!("events_publish_failed_total").increment(1);
                tracing::error!(error = %e, "failed to publish event");
            }
        }
        result
    }

    /// Publishes an `order.*` event.
    pub async fn publish_order(
        &self,
        event_type: EventType,
        order: SimplifiedOrder,
    ) -> Result<(), PublishError> {
        self.publish(event_type, OrderPayload { order }).await
    }
}

/// A message accepted by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub body: Vec<u8>,
}

/// In-memory broker for tests and local runs without RabbitMQ.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail while set.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Delays every send by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Returns the messages accepted so far.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Removes the accepted messages and dispatches them, in send order, to `router`.
    pub async fn deliver_to(&self, router: &EventRouter) -> Vec<DispatchReport> {
        let pending = std::mem::take(
            &mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut reports = Vec::with_capacity(pending.len());
        for message in pending {
            reports.push(router.dispatch(&message.topic, &message.body).await);
        }
        reports
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, topic: &str, body: Vec<u8>) -> Result<(), BusError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(BusError::Publish("broker unavailable".to_string()));
        }

        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedMessage {
                topic: topic.to_string(),
                body,
            });
        Ok(())
    }
}
