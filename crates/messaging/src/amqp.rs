//! RabbitMQ transport.
//!
//! Messages are published to a durable topic exchange with the event type as
//! routing key. The consumer binds one queue to every pattern registered on
//! the router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, ExchangeKind,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::task::JoinHandle;

use crate::error::BusError;
use crate::publisher::Broker;
use crate::router::EventRouter;

/// Exchange shared by the services.
pub const DEFAULT_EXCHANGE: &str = "events";

/// Connection settings for RabbitMQ.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    pub exchange: String,
    /// Queue this service consumes from.
    pub queue: String,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            queue: queue.into(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }
}

async fn open_channel(pool: &Pool) -> Result<Channel, BusError> {
    let conn = pool.get().await.map_err(|e: PoolError| {
        BusError::Connection(format!("Failed to get connection from pool: {e}"))
    })?;

    conn.create_channel()
        .await
        .map_err(|e| BusError::Connection(format!("Failed to create channel: {e}")))
}

/// Publishes to the exchange over pooled connections.
#[derive(Clone)]
pub struct AmqpBroker {
    pool: Pool,
    exchange: String,
}

impl AmqpBroker {
    /// Connects and declares the exchange.
    pub async fn connect(config: &AmqpConfig) -> Result<Self, BusError> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {e}")))?;

        let channel = open_channel(&pool).await?;
        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("Failed to declare exchange: {e}")))?;

        tracing::info!(exchange = %config.exchange, "connected to AMQP");

        Ok(Self {
            pool,
            exchange: config.exchange.clone(),
        })
    }

    /// Returns the connection pool, for sharing with a consumer.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn send(&self, topic: &str, body: Vec<u8>) -> Result<(), BusError> {
        let channel = open_channel(&self.pool).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Publish(format!("Failed to enable publisher confirms: {e}")))?;
        let properties = BasicProperties::default().with_content_type("application/json".into());

        let confirm = channel
            .basic_publish(
                &self.exchange,
                topic,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {e}")))?;

        let confirmation = confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {e}")))?;
        if confirmation.is_nack() {
            return Err(BusError::Publish(format!(
                "Broker rejected message for {topic}"
            )));
        }

        tracing::debug!(exchange = %self.exchange, routing_key = %topic, "message published");
        Ok(())
    }
}

/// Feeds deliveries from the service queue into an [`EventRouter`].
pub struct AmqpConsumer {
    pool: Pool,
    config: AmqpConfig,
    router: Arc<EventRouter>,
}

impl AmqpConsumer {
    pub fn new(pool: Pool, config: AmqpConfig, router: Arc<EventRouter>) -> Self {
        Self {
            pool,
            config,
            router,
        }
    }

    /// Spawns the consumer loop. It reconnects with backoff until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();
        let mut backoff = backoff_builder.build();

        loop {
            match self.setup().await {
                Ok(mut consumer) => {
                    tracing::info!(queue = %self.config.queue, "consumer connected, processing messages");
                    backoff = backoff_builder.build();

                    while let Some(delivery) = consumer.next().await {
                        match delivery {
                            Ok(delivery) => self.process_delivery(delivery).await,
                            Err(e) => {
                                tracing::error!(error = %e, "consumer delivery error, will reconnect");
                                break;
                            }
                        }
                    }
                    tracing::info!(queue = %self.config.queue, "consumer stream ended, reconnecting");
                }
                Err(e) => {
                    tracing::error!(error = %e, queue = %self.config.queue, "failed to set up consumer");
                }
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    async fn setup(&self) -> Result<lapin::Consumer, BusError> {
        let channel = open_channel(&self.pool).await?;

        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {e}")))?;

        for pattern in self.router.patterns() {
            channel
                .queue_bind(
                    &self.config.queue,
                    &self.config.exchange,
                    pattern.as_str(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| BusError::Subscribe(format!("Failed to bind queue: {e}")))?;
            tracing::debug!(queue = %self.config.queue, routing_key = %pattern, "bound queue");
        }

        channel
            .basic_consume(
                &self.config.queue,
                "orders-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {e}")))
    }

    /// Dispatches one delivery and acknowledges it whatever the handlers did.
    async fn process_delivery(&self, delivery: Delivery) {
        let topic = delivery.routing_key.as_str();
        let report = self.router.dispatch(topic, &delivery.data).await;
        if !report.is_clean() {
            tracing::warn!(
                routing_key = %topic,
                failures = report.failures.len(),
                "message handled with failures"
            );
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            tracing::error!(error = %e, "failed to ack message");
        }
    }
}
