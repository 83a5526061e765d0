//! Event types and the topic keys derived from them.
//!
//! A topic key is the literal event type string (`"product.created"`). It is used
//! both as the broker routing key and as the inbound router's dispatch key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern that matches every topic.
pub const WILDCARD_TOPIC: &str = "#";

/// Entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Order,
    Customer,
    Product,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
        }
    }
}

/// Lifecycle phase an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Created,
    Updated,
    Deleted,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Created => "created",
            LifecyclePhase::Updated => "updated",
            LifecyclePhase::Deleted => "deleted",
        }
    }
}

/// One of the nine entity × lifecycle events exchanged over the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "order.deleted")]
    OrderDeleted,
    #[serde(rename = "customer.created")]
    CustomerCreated,
    #[serde(rename = "customer.updated")]
    CustomerUpdated,
    #[serde(rename = "customer.deleted")]
    CustomerDeleted,
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
}

/// Returned when a string is not one of the known topics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::OrderCreated,
        EventType::OrderUpdated,
        EventType::OrderDeleted,
        EventType::CustomerCreated,
        EventType::CustomerUpdated,
        EventType::CustomerDeleted,
        EventType::ProductCreated,
        EventType::ProductUpdated,
        EventType::ProductDeleted,
    ];

    /// Builds the event type for an entity and phase.
    pub fn new(kind: EntityKind, phase: LifecyclePhase) -> Self {
        use EntityKind::*;
        use LifecyclePhase::*;
        match (kind, phase) {
            (Order, Created) => EventType::OrderCreated,
            (Order, Updated) => EventType::OrderUpdated,
            (Order, Deleted) => EventType::OrderDeleted,
            (Customer, Created) => EventType::CustomerCreated,
            (Customer, Updated) => EventType::CustomerUpdated,
            (Customer, Deleted) => EventType::CustomerDeleted,
            (Product, Created) => EventType::ProductCreated,
            (Product, Updated) => EventType::ProductUpdated,
            (Product, Deleted) => EventType::ProductDeleted,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EventType::OrderCreated | EventType::OrderUpdated | EventType::OrderDeleted => {
                EntityKind::Order
            }
            EventType::CustomerCreated
            | EventType::CustomerUpdated
            | EventType::CustomerDeleted => EntityKind::Customer,
            EventType::ProductCreated
            | EventType::ProductUpdated
            | EventType::ProductDeleted => EntityKind::Product,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        match self {
            EventType::OrderCreated | EventType::CustomerCreated | EventType::ProductCreated => {
                LifecyclePhase::Created
            }
            EventType::OrderUpdated | EventType::CustomerUpdated | EventType::ProductUpdated => {
                LifecyclePhase::Updated
            }
            EventType::OrderDeleted | EventType::CustomerDeleted | EventType::ProductDeleted => {
                LifecyclePhase::Deleted
            }
        }
    }

    /// Returns the broker routing key for this event type.
    pub fn as_topic(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order.created",
            EventType::OrderUpdated => "order.updated",
            EventType::OrderDeleted => "order.deleted",
            EventType::CustomerCreated => "customer.created",
            EventType::CustomerUpdated => "customer.updated",
            EventType::CustomerDeleted => "customer.deleted",
            EventType::ProductCreated => "product.created",
            EventType::ProductUpdated => "product.updated",
            EventType::ProductDeleted => "product.deleted",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_topic())
    }
}

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_topic() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}
