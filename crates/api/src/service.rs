//! Order use cases behind the HTTP routes.
//!
//! Every mutation commits locally first. Join records and the outbound event
//! are best effort afterwards: their failures are logged and the request
//! still succeeds with the committed order.

use common::{CustomerId, EventType, OrderId, ProductId};
use enrichment::Enricher;
use messaging::{EventPublisher, SimplifiedOrder};
use store::{NewOrder, Order, OrderChanges, OrderFilter, OrderStore};

use crate::auth::Claims;
use crate::error::ApiError;

/// Coordinates the store, the outbound publisher and products enrichment.
pub struct OrderService<S> {
    store: S,
    publisher: EventPublisher,
    enricher: Enricher,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S, publisher: EventPublisher, enricher: Enricher) -> Self {
        Self {
            store,
            publisher,
            enricher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn require_admin(caller: &Claims, action: &str) -> Result<(), ApiError> {
        if caller.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Forbidden: Only admins can {action} orders"
            )))
        }
    }

    /// Lists every order for admins and the caller's own orders otherwise.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
    pub async fn list(&self, caller: &Claims) -> Result<Vec<Order>, ApiError> {
        let filter = if caller.is_admin() {
            OrderFilter::all()
        } else {
            match caller.customer_id() {
                Some(customer_id) => OrderFilter::for_customer(customer_id),
                None => return Ok(Vec::new()),
            }
        };
        Ok(self.store.list_orders(filter).await?)
    }

    /// Fetches one order with its products.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
    pub async fn get(&self, caller: &Claims, id: OrderId) -> Result<Order, ApiError> {
        let mut order = self.store.get_order(id).await.map_err(|e| {
            if e.is_not_found() {
                ApiError::NotFound("Order not found".to_string())
            } else {
                e.into()
            }
        })?;

        if !caller.can_access(order.customer_id) {
            return Err(ApiError::Forbidden(
                "Forbidden: You can only access your own orders".to_string(),
            ));
        }

        self.enricher.enrich_one(&mut order).await;
        Ok(order)
    }

    /// Lists a customer's orders, fetching their products concurrently.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
    pub async fn list_for_customer(
        &self,
        caller: &Claims,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, ApiError> {
        if !caller.can_access(customer_id) {
            return Err(ApiError::Forbidden(
                "Forbidden: You can only access your own orders".to_string(),
            ));
        }

        let orders = self
            .store
            .list_orders(OrderFilter::for_customer(customer_id))
            .await?;
        Ok(self.enricher.enrich_all(orders).await)
    }

    /// Resolves who an order is created for: admins may name any customer,
    /// everyone else orders for themselves. A requested id of 0 counts as unset.
    fn resolve_customer(
        caller: &Claims,
        requested: Option<CustomerId>,
    ) -> Result<CustomerId, ApiError> {
        if caller.is_admin() {
            let requested = requested.filter(|c| c.as_i64() != 0);
            return requested.or_else(|| caller.customer_id()).ok_or_else(|| {
                ApiError::BadRequest("customerId is required".to_string())
            });
        }

        caller.customer_id().ok_or_else(|| {
            ApiError::Forbidden("Forbidden: caller is not a customer".to_string())
        })
    }

    /// Creates an order, its join records and announces it.
    #[tracing::instrument(skip(self, caller, product_ids), fields(caller = %caller.subject, products = product_ids.len()))]
    pub async fn create(
        &self,
        caller: &Claims,
        requested: Option<CustomerId>,
        product_ids: Vec<ProductId>,
    ) -> Result<Order, ApiError> {
        let customer_id = Self::resolve_customer(caller, requested)?;
        let order = self.store.create_order(NewOrder { customer_id }).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, %customer_id, "order created");

        if let Err(e) = self.store.create_customer_order(customer_id, order.id).await {
            tracing::warn!(order_id = %order.id, error = %e, "failed to record customer order");
        }

        if !product_ids.is_empty()
            && let Err(e) = self.store.create_order_products(order.id, &product_ids).await
        {
            tracing::warn!(order_id = %order.id, error = %e, "failed to record order products");
        }

        let event = SimplifiedOrder {
            order_id: order.id,
            customer_id,
            product_ids,
        };
        // Logged by the publisher; the order is already committed.
        let _ = self.publisher.publish_order(EventType::OrderCreated, event).await;

        Ok(order)
    }

    /// Replaces the customer of an order. Admin only.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
    pub async fn update(
        &self,
        caller: &Claims,
        id: OrderId,
        changes: OrderChanges,
    ) -> Result<Order, ApiError> {
        Self::require_admin(caller, "update")?;

        let order = self.store.update_order(id, changes).await?;
        tracing::info!(order_id = %order.id, "order updated");

        let event = SimplifiedOrder {
            order_id: order.id,
            customer_id: order.customer_id,
            product_ids: Vec::new(),
        };
        let _ = self.publisher.publish_order(EventType::OrderUpdated, event).await;

        Ok(order)
    }

    /// Deletes an order and announces it. Admin only.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.subject))]
    pub async fn delete(&self, caller: &Claims, id: OrderId) -> Result<Order, ApiError> {
        Self::require_admin(caller, "delete")?;

        let order = self.store.get_order(id).await?;
        self.store.delete_order(id).await?;
        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(order_id = %order.id, "order deleted");

        let event = SimplifiedOrder {
            order_id: order.id,
            customer_id: order.customer_id,
            product_ids: Vec::new(),
        };
        let _ = self.publisher.publish_order(EventType::OrderDeleted, event).await;

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use enrichment::InMemoryProductsClient;
    use messaging::{InMemoryBroker, OrderPayload, decode};
    use store::{InMemoryOrderStore, MirrorKey, Product};

    struct Fixture {
        service: OrderService<InMemoryOrderStore>,
        store: InMemoryOrderStore,
        broker: InMemoryBroker,
        products: InMemoryProductsClient,
    }

    fn fixture() -> Fixture {
        let store = InMemoryOrderStore::new();
        let broker = InMemoryBroker::new();
        let products = InMemoryProductsClient::new();
        let service = OrderService::new(
            store.clone(),
            EventPublisher::new(Arc::new(broker.clone())),
            Enricher::new(Arc::new(products.clone())),
        );
        Fixture {
            service,
            store,
            broker,
            products,
        }
    }

    fn admin() -> Claims {
        Claims::new("ops", &["admin"])
    }

    fn customer(id: i64) -> Claims {
        Claims::new(id.to_string(), &[])
    }

    async fn mirror_customer(store: &InMemoryOrderStore, id: i64) {
        store
            .insert_mirror(MirrorKey::Customer(CustomerId::new(id)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn customer_creates_for_themselves_whatever_the_body_says() {
        let f = fixture();
        mirror_customer(&f.store, 3).await;

        let order = f
            .service
            .create(&customer(3), Some(CustomerId::new(99)), Vec::new())
            .await
            .unwrap();

        assert_eq!(order.customer_id, CustomerId::new(3));
        assert_eq!(f.store.customer_orders_for(order.id).await.len(), 1);

        let messages = f.broker.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "order.created");
        let envelope = decode::<OrderPayload>(&messages[0].body).unwrap();
        assert_eq!(envelope.payload.order.customer_id, CustomerId::new(3));
    }

    #[tokio::test]
    async fn admin_creates_for_requested_customer() {
        let f = fixture();
        let order = f
            .service
            .create(&admin(), Some(CustomerId::new(5)), Vec::new())
            .await
            .unwrap();
        assert_eq!(order.customer_id, CustomerId::new(5));

        let err = f.service.create(&admin(), None, Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn admin_zero_customer_id_falls_back_to_own_id() {
        let f = fixture();
        let admin_customer = Claims::new("12", &["admin"]);

        let order = f
            .service
            .create(&admin_customer, Some(CustomerId::new(0)), Vec::new())
            .await
            .unwrap();
        assert_eq!(order.customer_id, CustomerId::new(12));

        let err = f
            .service
            .create(&admin(), Some(CustomerId::new(0)), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(f.store.list_orders(OrderFilter::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_numeric_customer_cannot_create() {
        let f = fixture();
        let err = f
            .service
            .create(&Claims::new("alice", &[]), Some(CustomerId::new(1)), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(f.store.list_orders(OrderFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_keeps_order() {
        let f = fixture();
        f.broker.set_fail_on_send(true);

        let order = f
            .service
            .create(&customer(3), None, vec![ProductId::new(1)])
            .await
            .unwrap();

        assert!(f.store.get_order(order.id).await.is_ok());
        assert_eq!(f.broker.message_count(), 0);
    }

    #[tokio::test]
    async fn join_record_failure_keeps_order_and_still_publishes() {
        let f = fixture();
        f.store.set_fail_join_records(true);

        let order = f
            .service
            .create(&customer(3), None, vec![ProductId::new(1)])
            .await
            .unwrap();

        assert!(f.store.get_order(order.id).await.is_ok());
        assert!(f.store.order_products_for(order.id).await.is_empty());
        assert_eq!(f.broker.message_count(), 1);
    }

    #[tokio::test]
    async fn get_enforces_ownership_and_enriches() {
        let f = fixture();
        let order = f.service.create(&customer(3), None, Vec::new()).await.unwrap();
        f.products
            .set_products(order.id, vec![Product::new(ProductId::new(10))]);

        let fetched = f.service.get(&customer(3), order.id).await.unwrap();
        assert_eq!(fetched.products.len(), 1);

        let err = f.service.get(&customer(4), order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = f.service.get(&admin(), OrderId::new(999)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_scopes_to_caller() {
        let f = fixture();
        f.service.create(&customer(3), None, Vec::new()).await.unwrap();
        f.service.create(&customer(4), None, Vec::new()).await.unwrap();

        assert_eq!(f.service.list(&admin()).await.unwrap().len(), 2);
        assert_eq!(f.service.list(&customer(3)).await.unwrap().len(), 1);
        assert!(
            f.service
                .list(&Claims::new("alice", &[]))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn mutations_are_admin_only() {
        let f = fixture();
        let order = f.service.create(&customer(3), None, Vec::new()).await.unwrap();

        let changes = OrderChanges {
            customer_id: CustomerId::new(4),
        };
        let err = f
            .service
            .update(&customer(3), order.id, changes)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = f.service.delete(&customer(3), order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let updated = f.service.update(&admin(), order.id, changes).await.unwrap();
        assert_eq!(updated.customer_id, CustomerId::new(4));

        f.service.delete(&admin(), order.id).await.unwrap();
        assert!(f.store.get_order(order.id).await.is_err());

        let topics: Vec<_> = f.broker.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["order.created", "order.updated", "order.deleted"]);
    }
}
