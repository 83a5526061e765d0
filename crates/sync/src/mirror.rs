//! Sync handler for one foreign entity kind and lifecycle phase.

use async_trait::async_trait;
use common::{EntityKind, EventType, LifecyclePhase};
use messaging::{
    CodecError, CustomerPayload, EventHandler, HandlerError, ProductPayload, decode,
};
use store::{MirrorKey, MirrorKind, OrderStore, StoreError};

/// Applies `customer.*` or `product.*` events to the local mirror tables.
///
/// - created: inserts the row; a row that already exists is left as is
/// - updated: inserts or replaces the row
/// - deleted: removes the row; a missing row is not an error
pub struct MirrorSyncHandler<S> {
    store: S,
    kind: MirrorKind,
    phase: LifecyclePhase,
}

impl<S: OrderStore> MirrorSyncHandler<S> {
    pub fn new(store: S, kind: MirrorKind, phase: LifecyclePhase) -> Self {
        Self { store, kind, phase }
    }

    /// Returns the event this handler consumes.
    pub fn event_type(&self) -> EventType {
        let entity = match self.kind {
            MirrorKind::Customer => EntityKind::Customer,
            MirrorKind::Product => EntityKind::Product,
        };
        EventType::new(entity, self.phase)
    }

    fn decode_key(&self, body: &[u8]) -> Result<(EventType, MirrorKey), CodecError> {
        Ok(match self.kind {
            MirrorKind::Customer => {
                let envelope = decode::<CustomerPayload>(body)?;
                (
                    envelope.event_type,
                    MirrorKey::Customer(envelope.payload.customer.id),
                )
            }
            MirrorKind::Product => {
                let envelope = decode::<ProductPayload>(body)?;
                (
                    envelope.event_type,
                    MirrorKey::Product(envelope.payload.product.id),
                )
            }
        })
    }

    /// Applies this handler's lifecycle phase to one mirror row.
    pub async fn apply(&self, key: MirrorKey) -> Result<(), StoreError> {
        match self.phase {
            LifecyclePhase::Created => match self.store.insert_mirror(key).await {
                Err(StoreError::Duplicate { .. }) => {
                    tracing::info!(%key, "already mirrored, ignoring duplicate create");
                    Ok(())
                }
                other => other,
            },
            LifecyclePhase::Updated => self.store.upsert_mirror(key).await,
            LifecyclePhase::Deleted => {
                if !self.store.delete_mirror(key).await? {
                    tracing::debug!(%key, "not mirrored, nothing to delete");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for MirrorSyncHandler<S> {
    fn name(&self) -> &'static str {
        match self.kind {
            MirrorKind::Customer => "customer-sync",
            MirrorKind::Product => "product-sync",
        }
    }

    #[tracing::instrument(skip(self, body), fields(handler = self.name()))]
    async fn handle(&self, topic: &str, body: &[u8]) -> Result<(), HandlerError> {
        let (event_type, key) = self.decode_key(body).inspect_err(|e| {
            tracing::error!(error = %e, "failed to decode event");
        })?;

        if event_type != self.event_type() {
            tracing::warn!(
                %event_type,
                expected = %self.event_type(),
                "envelope type differs from topic, applying as topic"
            );
        }

        tracing::info!(%key, "received event");

        self.apply(key).await.map_err(|e| {
            tracing::error!(%key, error = %e, "failed to apply event to local read-model");
            HandlerError::failed(e)
        })?;

        metrics::counter!("mirror_events_applied_total", "kind" => self.kind.as_str())
            .increment(1);
        tracing::info!(%key, "local read-model updated");
        Ok(())
    }
}
