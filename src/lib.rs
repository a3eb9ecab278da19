/// Areaflow: action-reaction automation engine
///
/// This library provides a polling-based trigger evaluation engine over
/// pluggable service integrations: Areas bind one trigger (timer tick, new
/// GitHub issue, new email) to one reaction (Discord message, GitHub
/// issue) with {{placeholder}} template substitution in between.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Area model layer - stored automations, connections, and persistence
pub mod area;

// Service integration layer - the uniform capability contract and the
// shipped integrations (timer, github, gmail, discord)
pub mod integration;

// Trigger evaluation runtime - config resolution, dispatch, polling loops
pub mod runtime;

// HTTP API layer - discovery and Area management endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use area::{Area, AreaStore, ConnectionStore, ServiceConnection};
pub use error::EngineError;
pub use integration::{ServiceIntegration, ServiceRegistry, TriggerEvent};
pub use runtime::{PollingScheduler, TickStats};
pub use server::start_server;
