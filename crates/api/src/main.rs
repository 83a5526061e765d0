//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::config::Config;
use enrichment::{HttpProductsClient, ProductsClient};
use messaging::{AmqpBroker, AmqpConsumer, Broker, InMemoryBroker};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Collaborators shared by both store backends.
struct Runtime {
    config: Config,
    amqp: Option<AmqpBroker>,
    products: Arc<dyn ProductsClient>,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Outbound collaborators
    let products: Arc<dyn ProductsClient> = Arc::new(HttpProductsClient::with_timeout(
        config.products_url.as_str(),
        config.enrichment_timeout,
    )?);

    let amqp = match config.amqp() {
        Some(amqp_config) => Some(AmqpBroker::connect(&amqp_config).await?),
        None => {
            tracing::warn!("AMQP_URL not set, events stay in memory and nothing is consumed");
            None
        }
    };

    let runtime = Runtime {
        config,
        amqp,
        products,
        metrics_handle,
    };

    // 4. Store backend
    match runtime.config.database_dsn.clone() {
        Some(dsn) => {
            let store = PostgresOrderStore::connect(&dsn).await?;
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL");
            serve(runtime, Arc::new(store)).await
        }
        None => {
            tracing::warn!("DATABASE_DSN not set, using in-memory store");
            serve(runtime, Arc::new(InMemoryOrderStore::new())).await
        }
    }
}

async fn serve<S: OrderStore + 'static>(runtime: Runtime, store: Arc<S>) -> Result<(), Box<dyn Error>> {
    let Runtime {
        config,
        amqp,
        products,
        metrics_handle,
    } = runtime;

    // 5. Inbound consumer feeding the local read-model
    let consumer = match (&amqp, config.amqp()) {
        (Some(broker), Some(amqp_config)) => {
            let router = Arc::new(sync::setup_event_handlers(Arc::clone(&store)));
            tracing::info!(handlers = router.handler_count(), "starting event consumer");
            Some(AmqpConsumer::new(broker.pool().clone(), amqp_config, router).spawn())
        }
        _ => None,
    };

    let broker: Arc<dyn Broker> = match amqp {
        Some(broker) => Arc::new(broker),
        None => Arc::new(InMemoryBroker::new()),
    };

    // 6. Build the application
    let state = api::create_state(store, broker, products, &config);
    let app = api::create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(consumer) = consumer {
        consumer.abort();
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
