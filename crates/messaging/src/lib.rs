//! Broker-facing side of the orders service.
//!
//! - [`EventEnvelope`] and the [`encode`]/[`decode`] codec for the JSON wire format
//! - [`EventPublisher`] announcing local mutations through a [`Broker`]
//! - [`EventRouter`] dispatching inbound messages to [`EventHandler`]s by topic
//! - RabbitMQ adapters: [`AmqpBroker`] and [`AmqpConsumer`]

pub mod amqp;
pub mod envelope;
pub mod error;
pub mod publisher;
pub mod router;

pub use amqp::{AmqpBroker, AmqpConfig, AmqpConsumer};
pub use envelope::{
    CustomerPayload, EntityRef, EventEnvelope, OrderPayload, ProductPayload, SimplifiedOrder,
    decode, encode,
};
pub use error::{BusError, CodecError, HandlerError, PublishError};
pub use publisher::{
    Broker, DEFAULT_PUBLISH_TIMEOUT, EventPublisher, InMemoryBroker, PublishedMessage,
};
pub use router::{DispatchReport, EventHandler, EventRouter, HandlerFailure, TopicPattern};
