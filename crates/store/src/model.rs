//! Persisted entities and the transient product data attached to orders.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// An order owned by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Product data fetched from the products service at read time.
    /// Never written back to the store.
    #[serde(default)]
    pub products: Vec<Product>,
}

/// A product as described by the products service.
///
/// Only `id` is interpreted here; every other field is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn new(id: ProductId) -> Self {
        Self {
            id,
            details: serde_json::Map::new(),
        }
    }

    /// Adds a pass-through attribute.
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Fields needed to create an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
}

/// Replacement values for an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChanges {
    pub customer_id: CustomerId,
}

/// Filter applied when listing orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub customer_id: Option<CustomerId>,
}

impl OrderFilter {
    /// Matches every order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches the orders of one customer.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.customer_id.is_none_or(|c| order.customer_id == c)
    }
}

/// Links an order to the customer that placed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrder {
    pub id: i64,
    pub customer_id: CustomerId,
    pub order_id: OrderId,
}

/// Links an order to one of its products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProduct {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
}

/// Which foreign read-model a mirror row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorKind {
    Customer,
    Product,
}

impl MirrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorKind::Customer => "customer",
            MirrorKind::Product => "product",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            MirrorKind::Customer => "customers",
            MirrorKind::Product => "products",
        }
    }
}

/// Key of a locally mirrored customer or product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorKey {
    Customer(CustomerId),
    Product(ProductId),
}

impl MirrorKey {
    pub fn kind(&self) -> MirrorKind {
        match self {
            MirrorKey::Customer(_) => MirrorKind::Customer,
            MirrorKey::Product(_) => MirrorKind::Product,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            MirrorKey::Customer(id) => id.as_i64(),
            MirrorKey::Product(id) => id.as_i64(),
        }
    }
}

impl std::fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind().as_str(), self.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(customer: i64) -> Order {
        Order {
            id: OrderId::new(1),
            customer_id: CustomerId::new(customer),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            products: Vec::new(),
        }
    }

    #[test]
    fn filter_for_customer_matches_only_owner() {
        let filter = OrderFilter::for_customer(CustomerId::new(3));
        assert!(filter.matches(&order(3)));
        assert!(!filter.matches(&order(4)));
        assert!(OrderFilter::all().matches(&order(4)));
    }

    #[test]
    fn product_keeps_unknown_fields() {
        let json = serde_json::json!({"id": 5, "name": "Arabica", "stock": 12});
        let product: Product = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(product.id, ProductId::new(5));
        assert_eq!(product.details["name"], "Arabica");
        assert_eq!(serde_json::to_value(&product).unwrap(), json);
    }

    #[test]
    fn order_without_products_field_deserializes() {
        let json = serde_json::json!({
            "id": 1,
            "customerId": 2,
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        let order: Order = serde_json::from_value(json).unwrap();
        assert!(order.products.is_empty());
    }

    #[test]
    fn mirror_key_display() {
        assert_eq!(MirrorKey::Product(ProductId::new(42)).to_string(), "product 42");
    }
}
