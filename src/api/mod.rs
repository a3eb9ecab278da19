/// HTTP API layer
///
/// REST endpoints for service discovery and Area management, plus the
/// manual scheduler trigger used by operators and tests.

pub mod areas;
pub mod catalog;

use crate::area::store::{AreaStore, ConnectionStore};
use crate::integration::ServiceRegistry;
use crate::runtime::PollingScheduler;
use std::sync::Arc;

/// Shared state for every API handler
#[derive(Clone)]
pub struct AppState {
    pub areas: AreaStore,
    pub connections: ConnectionStore,
    pub registry: Arc<ServiceRegistry>,
    pub scheduler: Arc<PollingScheduler>,
}
