use async_trait::async_trait;

use crate::{
    CustomerId, CustomerOrder, MirrorKey, MirrorKind, NewOrder, Order, OrderChanges, OrderFilter,
    OrderId, OrderProduct, ProductId, Result,
};

/// Persistence gateway for orders, their join records and the foreign read-model.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Lists orders matching the filter, ordered by id.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>>;

    /// Fetches one order, failing with `NotFound` if it does not exist.
    async fn get_order(&self, id: OrderId) -> Result<Order>;

    /// Creates an order and returns it with its assigned id.
    async fn create_order(&self, new: NewOrder) -> Result<Order>;

    /// Applies changes to an existing order.
    async fn update_order(&self, id: OrderId, changes: OrderChanges) -> Result<Order>;

    /// Deletes an order and the join records pointing at it.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    /// Records that a customer placed an order.
    async fn create_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CustomerOrder>;

    /// Records the products of an order. Either every row is written or none is.
    async fn create_order_products(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Vec<OrderProduct>>;

    /// Inserts a mirror row, failing with `Duplicate` if it already exists.
    async fn insert_mirror(&self, key: MirrorKey) -> Result<()>;

    /// Inserts or replaces a mirror row.
    async fn upsert_mirror(&self, key: MirrorKey) -> Result<()>;

    /// Removes a mirror row. Returns whether a row was removed.
    async fn delete_mirror(&self, key: MirrorKey) -> Result<bool>;

    async fn mirror_exists(&self, key: MirrorKey) -> Result<bool>;

    async fn mirror_count(&self, kind: MirrorKind) -> Result<u64>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        (**self).list_orders(filter).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        (**self).get_order(id).await
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        (**self).create_order(new).await
    }

    async fn update_order(&self, id: OrderId, changes: OrderChanges) -> Result<Order> {
        (**self).update_order(id, changes).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        (**self).delete_order(id).await
    }

    async fn create_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CustomerOrder> {
        (**self).create_customer_order(customer_id, order_id).await
    }

    async fn create_order_products(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Vec<OrderProduct>> {
        (**self).create_order_products(order_id, product_ids).await
    }

    async fn insert_mirror(&self, key: MirrorKey) -> Result<()> {
        (**self).insert_mirror(key).await
    }

    async fn upsert_mirror(&self, key: MirrorKey) -> Result<()> {
        (**self).upsert_mirror(key).await
    }

    async fn delete_mirror(&self, key: MirrorKey) -> Result<bool> {
        (**self).delete_mirror(key).await
    }

    async fn mirror_exists(&self, key: MirrorKey) -> Result<bool> {
        (**self).mirror_exists(key).await
    }

    async fn mirror_count(&self, kind: MirrorKind) -> Result<u64> {
        (**self).mirror_count(kind).await
    }
}
