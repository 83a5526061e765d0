//! Inbound side of the foreign read-model.
//!
//! Customers and products are owned by other services. This crate applies their
//! `created`/`updated`/`deleted` events to the local mirror tables so that join
//! records can reference them. Order events are published by this service but
//! never consumed here.

pub mod debug;
pub mod mirror;

use std::sync::Arc;

use common::{LifecyclePhase, WILDCARD_TOPIC};
use messaging::EventRouter;
use store::{MirrorKind, OrderStore};

pub use debug::DebugHandler;
pub use mirror::MirrorSyncHandler;

/// Builds the router used by the broker consumer.
///
/// Registers one mirror handler per customer/product lifecycle topic and the
/// debug handler on the wildcard.
pub fn setup_event_handlers<S>(store: S) -> EventRouter
where
    S: OrderStore + Clone + 'static,
{
    let mut router = EventRouter::new();

    for kind in [MirrorKind::Customer, MirrorKind::Product] {
        for phase in [
            LifecyclePhase::Created,
            LifecyclePhase::Updated,
            LifecyclePhase::Deleted,
        ] {
            let handler = MirrorSyncHandler::new(store.clone(), kind, phase);
            router.register(handler.event_type(), Arc::new(handler));
        }
    }

    router.register(WILDCARD_TOPIC, Arc::new(DebugHandler));
    router
}
