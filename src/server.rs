/// Server setup and initialization
///
/// Wires together all components: storage, service registry, connection
/// manager, dispatcher, polling scheduler, and HTTP routes. Provides the
/// application factory used by main and by integration tests.

use crate::{
    api::{areas::create_area_routes, catalog::create_catalog_routes, AppState},
    area::store::{AreaStore, ConnectionStore},
    config::Config,
    integration::{
        discord::DiscordIntegration, github::GitHubIntegration, gmail::GmailIntegration,
        timer::TimerIntegration, ConnectionManager, ServiceRegistry,
    },
    runtime::{PollingScheduler, ReactionDispatcher},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes and background loops
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("Connecting to database: {}", config.database.url);
    let pool = SqlitePool::connect(&config.database.url).await?;

    let areas = AreaStore::new(pool.clone());
    areas.init_schema().await?;
    let connections = ConnectionStore::new(pool);
    connections.init_schema().await?;

    // One shared outbound HTTP client for every integration.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.polling.call_timeout_secs))
        .build()?;

    tracing::info!("Registering service integrations");
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(TimerIntegration))?;
    registry.register(Arc::new(GitHubIntegration::new(
        http.clone(),
        config.oauth.github.clone(),
    )))?;
    registry.register(Arc::new(GmailIntegration::new(
        http.clone(),
        config.oauth.google.clone(),
    )))?;
    registry.register(Arc::new(DiscordIntegration::new(http.clone())))?;
    let registry = Arc::new(registry);
    tracing::info!("{} services registered", registry.len());

    let connection_manager = Arc::new(ConnectionManager::new(
        connections.clone(),
        http,
        chrono::Duration::seconds(config.polling.refresh_skew_secs as i64),
    ));

    let dispatcher = Arc::new(ReactionDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&connection_manager),
        Duration::from_secs(config.polling.call_timeout_secs),
    ));

    let scheduler = Arc::new(PollingScheduler::new(
        areas.clone(),
        Arc::clone(&registry),
        Arc::clone(&connection_manager),
        dispatcher,
        config.polling.clone(),
    ));
    scheduler.start();

    let app_state = AppState {
        areas,
        connections,
        registry,
        scheduler,
    };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_catalog_routes().with_state(app_state.clone()))
        .merge(create_area_routes().with_state(app_state));

    tracing::info!("Application initialized");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting areaflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
