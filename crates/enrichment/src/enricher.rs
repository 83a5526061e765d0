//! Concurrent products fan-out for order reads.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use futures_util::{StreamExt, stream};
use store::{Order, Product};

use crate::client::ProductsClient;
use crate::error::EnrichmentError;

/// Upper bound on a single products call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Products calls allowed in flight for one fan-out.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Attaches products to orders on read.
///
/// Failures never fail the read: an order whose call errors or times out keeps
/// its product list as it was and the rest of the batch is unaffected.
#[derive(Clone)]
pub struct Enricher {
    client: Arc<dyn ProductsClient>,
    call_timeout: Duration,
    max_in_flight: usize,
}

impl Enricher {
    pub fn new(client: Arc<dyn ProductsClient>) -> Self {
        Self {
            client,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    async fn fetch(&self, order_id: OrderId) -> Result<Vec<Product>, EnrichmentError> {
        tokio::time::timeout(self.call_timeout, self.client.products_for_order(order_id))
            .await
            .map_err(|_| EnrichmentError::Timeout(self.call_timeout))?
    }

    /// Fetches the products for one order. Returns whether the call succeeded.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn enrich_one(&self, order: &mut Order) -> bool {
        match self.fetch(order.id).await {
            Ok(products) => {
                order.products = products;
                true
            }
            Err(e) => {
                metrics::counter!("enrichment_failures_total").increment(1);
                tracing::warn!(error = %e, "failed to fetch products, returning order without them");
                false
            }
        }
    }

    /// Enriches every order concurrently and returns them in input order.
    #[tracing::instrument(skip(self, orders), fields(count = orders.len()))]
    pub async fn enrich_all(&self, orders: Vec<Order>) -> Vec<Order> {
        // Unordered so a slow order does not hold back the slots behind it.
        let mut enriched: Vec<(usize, Order)> = stream::iter(orders.into_iter().enumerate())
            .map(|(index, mut order)| async move {
                self.enrich_one(&mut order).await;
                (index, order)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        enriched.sort_unstable_by_key(|(index, _)| *index);
        enriched.into_iter().map(|(_, order)| order).collect()
    }
}
