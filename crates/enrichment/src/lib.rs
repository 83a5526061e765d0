//! Read-time enrichment of orders with product data.
//!
//! Product details are owned by the products service. Every read fetches them
//! again; nothing fetched here is written back to the store.

pub mod client;
pub mod enricher;
pub mod error;

pub use client::{HttpProductsClient, InMemoryProductsClient, ProductsClient, ProductsResponse};
pub use enricher::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_IN_FLIGHT, Enricher};
pub use error::EnrichmentError;
