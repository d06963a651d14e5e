//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use herald_common::config::AppConfig;
use herald_engine::dispatch::Dispatcher;
use herald_engine::events::UserEventBus;

use crate::ws::registry::ConnectionRegistry;

/// Application state shared across all route handlers via Axum `State`.
///
/// The registry, dispatcher, and event bus are constructed once by the
/// composing code (main or a test harness) and passed in; session handlers
/// never reach for ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub events: Arc<UserEventBus>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<Dispatcher>,
        events: Arc<UserEventBus>,
    ) -> Self {
        Self {
            pool,
            config,
            registry,
            dispatcher,
            events,
        }
    }
}
