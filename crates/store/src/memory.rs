use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    CustomerId, CustomerOrder, MirrorKey, MirrorKind, NewOrder, Order, OrderChanges, OrderFilter,
    OrderId, OrderProduct, ProductId, Result, StoreError, store::OrderStore,
};

#[derive(Default)]
struct MemoryState {
    orders: BTreeMap<OrderId, Order>,
    customer_orders: Vec<CustomerOrder>,
    order_products: Vec<OrderProduct>,
    mirrors: HashMap<MirrorKind, BTreeSet<i64>>,
    last_order_id: i64,
    last_join_id: i64,
}

impl MemoryState {
    fn next_join_id(&mut self) -> i64 {
        self.last_join_id += 1;
        self.last_join_id
    }

    fn has_mirror(&self, key: MirrorKey) -> bool {
        self.mirrors
            .get(&key.kind())
            .is_some_and(|ids| ids.contains(&key.as_i64()))
    }

    fn require_order(&self, order_id: OrderId) -> Result<()> {
        if self.orders.contains_key(&order_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey(format!("order {order_id} does not exist")))
        }
    }

    fn require_mirror(&self, key: MirrorKey) -> Result<()> {
        if self.has_mirror(key) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey(format!("{key} does not exist")))
        }
    }
}

/// In-memory order store for testing and local runs.
///
/// Enforces the same key and reference rules as the PostgreSQL schema, so join
/// records for unknown customers or products are rejected.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
    fail_join_records: Arc<AtomicBool>,
    fail_mirror_writes: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every join-record write fail while set.
    pub fn set_fail_join_records(&self, fail: bool) {
        self.fail_join_records.store(fail, Ordering::SeqCst);
    }

    /// Makes every mirror write fail while set.
    pub fn set_fail_mirror_writes(&self, fail: bool) {
        self.fail_mirror_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the customer-order join records of an order.
    pub async fn customer_orders_for(&self, order_id: OrderId) -> Vec<CustomerOrder> {
        self.state
            .read()
            .await
            .customer_orders
            .iter()
            .filter(|r| r.order_id == order_id)
            .copied()
            .collect()
    }

    /// Returns the order-product join records of an order.
    pub async fn order_products_for(&self, order_id: OrderId) -> Vec<OrderProduct> {
        self.state
            .read()
            .await
            .order_products
            .iter()
            .filter(|r| r.order_id == order_id)
            .copied()
            .collect()
    }

    fn check_join_writes(&self) -> Result<()> {
        if self.fail_join_records.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("join record writes disabled".to_string()));
        }
        Ok(())
    }

    fn check_mirror_writes(&self) -> Result<()> {
        if self.fail_mirror_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mirror writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.state
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "order",
                id: id.as_i64(),
            })
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;
        state.last_order_id += 1;
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(state.last_order_id),
            customer_id: new.customer_id,
            created_at: now,
            updated_at: now,
            products: Vec::new(),
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update_order(&self, id: OrderId, changes: OrderChanges) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "order",
            id: id.as_i64(),
        })?;
        order.customer_id = changes.customer_id;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                entity: "order",
                id: id.as_i64(),
            });
        }
        state.customer_orders.retain(|r| r.order_id != id);
        state.order_products.retain(|r| r.order_id != id);
        Ok(())
    }

    async fn create_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CustomerOrder> {
        self.check_join_writes()?;
        let mut state = self.state.write().await;
        state.require_order(order_id)?;
        state.require_mirror(MirrorKey::Customer(customer_id))?;

        let record = CustomerOrder {
            id: state.next_join_id(),
            customer_id,
            order_id,
        };
        state.customer_orders.push(record);
        Ok(record)
    }

    async fn create_order_products(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Vec<OrderProduct>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.check_join_writes()?;
        let mut state = self.state.write().await;
        state.require_order(order_id)?;
        for product_id in product_ids {
            state.require_mirror(MirrorKey::Product(*product_id))?;
        }

        let mut records = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            records.push(OrderProduct {
                id: state.next_join_id(),
                order_id,
                product_id: *product_id,
            });
        }
        state.order_products.extend(records.iter().copied());
        Ok(records)
    }

    async fn insert_mirror(&self, key: MirrorKey) -> Result<()> {
        self.check_mirror_writes()?;
        let mut state = self.state.write().await;
        let inserted = state
            .mirrors
            .entry(key.kind())
            .or_default()
            .insert(key.as_i64());
        if !inserted {
            return Err(StoreError::Duplicate {
                entity: key.kind().as_str(),
                id: key.as_i64(),
            });
        }
        Ok(())
    }

    async fn upsert_mirror(&self, key: MirrorKey) -> Result<()> {
        self.check_mirror_writes()?;
        let mut state = self.state.write().await;
        state
            .mirrors
            .entry(key.kind())
            .or_default()
            .insert(key.as_i64());
        Ok(())
    }

    async fn delete_mirror(&self, key: MirrorKey) -> Result<bool> {
        self.check_mirror_writes()?;
        let mut state = self.state.write().await;
        let removed = state
            .mirrors
            .get_mut(&key.kind())
            .is_some_and(|ids| ids.remove(&key.as_i64()));
        match key {
            MirrorKey::Customer(id) => state.customer_orders.retain(|r| r.customer_id != id),
            MirrorKey::Product(id) => state.order_products.retain(|r| r.product_id != id),
        }
        Ok(removed)
    }

    async fn mirror_exists(&self, key: MirrorKey) -> Result<bool> {
        Ok(self.state.read().await.has_mirror(key))
    }

    async fn mirror_count(&self, kind: MirrorKind) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.mirrors.get(&kind).map_or(0, |ids| ids.len() as u64))
    }
}
