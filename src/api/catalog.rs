/// Service discovery endpoints
///
/// Exposes the registered services with their action/reaction schemas so
/// clients can render configuration forms without hardcoding anything.
/// Built entirely from the in-memory registry; no side effects.

use crate::api::AppState;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};

pub fn create_catalog_routes() -> Router<AppState> {
    Router::new().route("/about.json", get(about))
}

/// GET /about.json
///
/// The standard discovery document: current server time plus the full
/// service catalog.
async fn about(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "server": {
            "current_time": Utc::now().timestamp(),
            "services": state.registry.catalog(),
        }
    }))
}
