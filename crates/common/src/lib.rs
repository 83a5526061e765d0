//! Shared identifiers and the broker event taxonomy.

pub mod event_type;
pub mod types;

pub use event_type::{EntityKind, EventType, LifecyclePhase, UnknownEventType, WILDCARD_TOPIC};
pub use types::{CustomerId, OrderId, ProductId};
