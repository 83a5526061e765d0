//! RabbitMQ integration tests
//!
//! These tests use a shared RabbitMQ container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p messaging --test amqp_integration -- --test-threads=1
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, EventType, ProductId};
use lapin::options::{ExchangeDeleteOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use messaging::{
    AmqpBroker, AmqpConfig, AmqpConsumer, Broker, CustomerPayload, EntityRef, EventHandler,
    EventPublisher, EventRouter, HandlerError, ProductPayload, decode,
};
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::rabbitmq::RabbitMq;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<RabbitMq>,
    url: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = RabbitMq::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5672).await.unwrap();
            let url = format!("amqp://guest:guest@{}:{}", host, port);

            Arc::new(ContainerInfo { container, url })
        })
        .await
        .clone()
}

/// Records product ids it managed to decode and counts the bodies it could not.
#[derive(Default)]
struct ProductRecorder {
    applied: Mutex<Vec<i64>>,
    calls: Mutex<usize>,
    failures: Mutex<usize>,
}

#[async_trait]
impl EventHandler for ProductRecorder {
    fn name(&self) -> &'static str {
        "product-recorder"
    }

    async fn handle(&self, _topic: &str, body: &[u8]) -> Result<(), HandlerError> {
        *self.calls.lock().unwrap() += 1;
        match decode::<ProductPayload>(body) {
            Ok(envelope) => {
                self.applied
                    .lock()
                    .unwrap()
                    .push(envelope.payload.product.id.as_i64());
                Ok(())
            }
            Err(e) => {
                *self.failures.lock().unwrap() += 1;
                Err(e.into())
            }
        }
    }
}

#[derive(Default)]
struct TopicRecorder {
    topics: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for TopicRecorder {
    fn name(&self) -> &'static str {
        "topic-recorder"
    }

    async fn handle(&self, topic: &str, _body: &[u8]) -> Result<(), HandlerError> {
        self.topics.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

async fn declare_queue(broker: &AmqpBroker, queue: &str, passive: bool) -> lapin::Queue {
    let conn = broker.pool().get().await.unwrap();
    let channel = conn.create_channel().await.unwrap();
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                passive,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
#[serial]
async fn consumer_acks_failed_and_successful_deliveries() {
    let info = get_container_info().await;
    let config = AmqpConfig::new(info.url.clone(), "orders-ack-test");
    let broker = AmqpBroker::connect(&config).await.unwrap();

    let products = Arc::new(ProductRecorder::default());
    let everything = Arc::new(TopicRecorder::default());
    let mut router = EventRouter::new();
    router.register(EventType::ProductCreated, products.clone());
    router.register("#", everything.clone());

    declare_queue(&broker, &config.queue, false).await;
    let consumer =
        AmqpConsumer::new(broker.pool().clone(), config.clone(), Arc::new(router)).spawn();

    // The consumer binds every pattern before it registers on the queue.
    for _ in 0..100 {
        if declare_queue(&broker, &config.queue, true).await.consumer_count() >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    broker
        .send("product.created", b"{not json".to_vec())
        .await
        .unwrap();

    let publisher = EventPublisher::new(Arc::new(broker.clone()));
    publisher
        .publish(
            EventType::ProductCreated,
            ProductPayload {
                product: EntityRef {
                    id: ProductId::new(42),
                },
            },
        )
        .await
        .unwrap();
    // Only the wildcard binding routes this one to the queue.
    publisher
        .publish(
            EventType::CustomerCreated,
            CustomerPayload {
                customer: EntityRef {
                    id: CustomerId::new(7),
                },
            },
        )
        .await
        .unwrap();

    wait_until(|| everything.topics.lock().unwrap().len() >= 3).await;

    assert_eq!(*products.calls.lock().unwrap(), 2);
    assert_eq!(*products.failures.lock().unwrap(), 1);
    assert_eq!(*products.applied.lock().unwrap(), vec![42]);
    assert_eq!(
        *everything.topics.lock().unwrap(),
        vec!["product.created", "product.created", "customer.created"]
    );

    // A rejected or requeued delivery would come back to the same consumer.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(*products.calls.lock().unwrap(), 2);
    assert_eq!(everything.topics.lock().unwrap().len(), 3);
    assert_eq!(
        declare_queue(&broker, &config.queue, true)
            .await
            .message_count(),
        0
    );

    consumer.abort();
}

#[tokio::test]
#[serial]
async fn send_fails_when_broker_rejects_publish() {
    let info = get_container_info().await;
    let config = AmqpConfig::new(info.url.clone(), "orders-confirm-test")
        .with_exchange("events-confirm-test");
    let broker = AmqpBroker::connect(&config).await.unwrap();

    broker
        .send("product.created", b"{}".to_vec())
        .await
        .unwrap();

    let conn = broker.pool().get().await.unwrap();
    let channel = conn.create_channel().await.unwrap();
    channel
        .exchange_delete(&config.exchange, ExchangeDeleteOptions::default())
        .await
        .unwrap();

    let result = broker.send("product.created", b"{}".to_vec()).await;
    assert!(result.is_err());
}
