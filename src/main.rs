/// Areaflow: action-reaction automation engine
///
/// Main entry point. Initializes configuration and starts the HTTP server
/// with the background polling scheduler.

use areaflow::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Service discovery at /about.json
/// - Area management API at /api/areas/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults plus AREAFLOW_* environment overrides)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
