//! Parley server
//!
//! Serves the message pipeline over HTTP with in-memory storage.

use parley::api::{create_router, AppState};
use parley::config::ServerConfig;
use parley::events::EventBus;
use parley::model::{GatewayModelClient, LoggingModelClient, TimeoutModelClient};
use parley::orchestrator::{Bootstrapper, MessageService};
use parley::repository::InMemoryRepository;
use parley::tools::{InMemoryProfileStore, InMemoryTaskStore, ProcessorRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GATEWAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    let registry = Arc::new(ProcessorRegistry::standard(
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(InMemoryTaskStore::new()),
    ));
    let mut bootstrapper = Bootstrapper::new(
        EventBus::new(),
        Arc::clone(&registry),
        Arc::new(InMemoryRepository::new()),
    )
    .with_history_scan_limit(config.history_scan_limit);

    if let Some(url) = &config.model_gateway {
        let gateway = GatewayModelClient::new(url, registry.definitions(), GATEWAY_CONNECT_TIMEOUT)?;
        let timed = TimeoutModelClient::new(Arc::new(gateway), config.model_timeout);
        bootstrapper = bootstrapper.with_model_client(Arc::new(LoggingModelClient::new(Arc::new(timed))));
        tracing::info!(
            gateway = %url,
            timeout_secs = config.model_timeout.as_secs(),
            tools = registry.definitions().len(),
            "Model gateway configured"
        );
    } else {
        tracing::warn!("No model gateway configured. Set PARLEY_MODEL_GATEWAY.");
    }

    let bootstrapper = Arc::new(bootstrapper);
    if let Err(e) = bootstrapper.ready().await {
        tracing::warn!(error = %e, "Pipeline not wired; requests will fail until it is");
    }

    let state = AppState::new(MessageService::new(Arc::clone(&bootstrapper)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bootstrapper.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
