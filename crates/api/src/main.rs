//! Herald API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::create_pool;
use herald_engine::dispatch::Dispatcher;
use herald_engine::events::{UserEventBus, spawn_user_registration_hook};
use herald_transport::RedisTransport;

use herald_api::routes::create_router;
use herald_api::state::AppState;
use herald_api::ws::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=debug,herald_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Group transport over Redis pub/sub
    let transport = Arc::new(RedisTransport::connect(&config.redis_url).await?);
    tracing::info!("Redis transport connected");

    // Dispatch pipeline and live-connection registry
    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        transport.clone(),
        Duration::from_millis(config.publish_timeout_ms),
    ));
    let registry = Arc::new(ConnectionRegistry::new(transport));

    // Domain event bus plus the user-registration fan-out hook
    let events = Arc::new(UserEventBus::default());
    spawn_user_registration_hook(
        &events,
        pool.clone(),
        dispatcher.clone(),
        config.backend_url.clone(),
    );

    // Build application state
    let state = AppState::new(pool, config, registry, dispatcher, events);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
