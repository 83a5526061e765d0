//! Products service client trait and implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use store::Product;

use crate::enricher::DEFAULT_CALL_TIMEOUT;
use crate::error::EnrichmentError;

/// Body of `GET /products/{orderID}/orders`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductsResponse {
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Source of the products attached to an order.
#[async_trait]
pub trait ProductsClient: Send + Sync {
    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>, EnrichmentError>;
}

/// HTTP client for the products service.
#[derive(Debug, Clone)]
pub struct HttpProductsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductsClient {
    /// Creates a client for the service at `base_url` (e.g. `http://products:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, EnrichmentError> {
        Self::with_timeout(base_url, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn products_url(&self, order_id: OrderId) -> String {
        format!("{}/products/{}/orders", self.base_url, order_id)
    }
}

#[async_trait]
impl ProductsClient for HttpProductsClient {
    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>, EnrichmentError> {
        let response = self.client.get(self.products_url(order_id)).send().await?;

        if response.status() != StatusCode::OK {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: ProductsResponse = serde_json::from_slice(&body)?;
        Ok(parsed.products)
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Products(Vec<Product>),
    Status(u16),
}

#[derive(Debug, Default)]
struct InMemoryProductsState {
    responses: HashMap<OrderId, Scripted>,
    delays: HashMap<OrderId, Duration>,
}

/// In-memory products service for testing.
///
/// Orders without a scripted response answer with status 404.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductsClient {
    state: Arc<Mutex<InMemoryProductsState>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl InMemoryProductsClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryProductsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers calls for `order_id` with `products`.
    pub fn set_products(&self, order_id: OrderId, products: Vec<Product>) {
        self.state()
            .responses
            .insert(order_id, Scripted::Products(products));
    }

    /// Answers calls for `order_id` with a bare status code.
    pub fn set_status(&self, order_id: OrderId, status: u16) {
        self.state()
            .responses
            .insert(order_id, Scripted::Status(status));
    }

    /// Delays the answer for `order_id`.
    pub fn set_delay(&self, order_id: OrderId, delay: Duration) {
        self.state().delays.insert(order_id, delay);
    }

    /// Returns the number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the highest number of calls that were in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductsClient for InMemoryProductsClient {
    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let (response, delay) = {
            let state = self.state();
            (
                state.responses.get(&order_id).cloned(),
                state.delays.get(&order_id).copied(),
            )
        };

        // Yield at least once so concurrent callers overlap.
        tokio::time::sleep(delay.unwrap_or(Duration::from_millis(1))).await;

        match response {
            Some(Scripted::Products(products)) => Ok(products),
            Some(Scripted::Status(status)) => Err(EnrichmentError::Status(status)),
            None => Err(EnrichmentError::Status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    #[test]
    fn products_url_joins_base_and_order() {
        let client = HttpProductsClient::new("http://products:8080/").unwrap();
        assert_eq!(
            client.products_url(OrderId::new(7)),
            "http://products:8080/products/7/orders"
        );
    }

    #[test]
    fn products_response_tolerates_missing_list() {
        let parsed: ProductsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.products.is_empty());
    }

    #[tokio::test]
    async fn in_memory_client_serves_scripts() {
        let client = InMemoryProductsClient::new();
        client.set_products(OrderId::new(1), vec![Product::new(ProductId::new(10))]);
        client.set_status(OrderId::new(2), 503);

        let products = client.products_for_order(OrderId::new(1)).await.unwrap();
        assert_eq!(products.len(), 1);

        let err = client.products_for_order(OrderId::new(2)).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Status(503)));

        let err = client.products_for_order(OrderId::new(3)).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Status(404)));

        assert_eq!(client.call_count(), 3);
    }
}
