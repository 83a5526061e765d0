//! HTTP surface and composition root of the orders service.
//!
//! Provides REST endpoints for orders, with structured logging (tracing) and
//! Prometheus metrics. Order reads are enriched with data from the products
//! service and every mutation is announced on the event bus.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod service;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use enrichment::{Enricher, ProductsClient};
use messaging::{Broker, EventPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;
use service::OrderService;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>)
                .put(routes::orders::update::<S>)
                .delete(routes::orders::delete::<S>),
        )
        .route(
            "/orders/{id}/customers",
            get(routes::orders::list_for_customer::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the store, the outbound publisher and the products client into the
/// application state.
pub fn create_state<S: OrderStore + 'static>(
    store: S,
    broker: Arc<dyn Broker>,
    products: Arc<dyn ProductsClient>,
    config: &Config,
) -> Arc<AppState<S>> {
    let publisher = EventPublisher::new(broker).with_timeout(config.publish_timeout);
    let enricher = Enricher::new(products)
        .with_call_timeout(config.enrichment_timeout)
        .with_max_in_flight(config.enrichment_max_in_flight);

    Arc::new(AppState {
        order_service: OrderService::new(store, publisher, enricher),
    })
}
