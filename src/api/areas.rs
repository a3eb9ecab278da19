/// Area management REST API endpoints
///
/// Minimal CRUD surface over the Area store plus the manual poll trigger.
/// Creation is where the model invariant is enforced: timer Areas carry a
/// timer config and no action connection, service Areas carry an action
/// connection whose service matches the trigger.

use crate::api::AppState;
use crate::area::store::NewArea;
use crate::area::types::{Area, TriggerConfig, WorkflowData};
use crate::integration::schema::unknown_config_keys;
use crate::runtime::resolver;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request body for Area creation
#[derive(Debug, Deserialize)]
pub struct CreateAreaRequest {
    pub name: String,
    pub trigger: TriggerConfig,
    pub reaction: TriggerConfig,
}

/// Request body for activation toggling
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub active: bool,
}

pub fn create_area_routes() -> Router<AppState> {
    Router::new()
        .route("/api/areas", post(create_area))
        .route("/api/areas", get(list_areas))
        .route("/api/areas/{id}", get(get_area))
        .route("/api/areas/{id}/status", patch(update_status))
        .route("/api/scheduler/poll", post(poll_now))
}

/// Create a new Area
///
/// POST /api/areas
/// Body: { "name": "...", "trigger": {...}, "reaction": {...} }
async fn create_area(
    State(state): State<AppState>,
    Json(payload): Json<CreateAreaRequest>,
) -> Result<Json<Area>, StatusCode> {
    if payload.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let Some(action_type) = payload.trigger.full_type() else {
        tracing::warn!("Area creation rejected: trigger has no type");
        return Err(StatusCode::BAD_REQUEST);
    };
    let Some(reaction_type) = payload.reaction.full_type() else {
        tracing::warn!("Area creation rejected: reaction has no type");
        return Err(StatusCode::BAD_REQUEST);
    };

    let action_service = match state.registry.lookup(&payload.trigger.service_id()) {
        Ok(service) => service,
        Err(e) => {
            tracing::warn!("Area creation rejected: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };
    let reaction_service = match state.registry.lookup(&payload.reaction.service_id()) {
        Ok(service) => service,
        Err(e) => {
            tracing::warn!("Area creation rejected: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    // Unknown config fields are ignored with a warning, never fatal.
    if let Some(definition) = action_service
        .actions()
        .into_iter()
        .find(|a| a.id == action_type)
    {
        unknown_config_keys(
            action_service.service_id(),
            &definition.fields,
            &payload.trigger.config,
        );
    }
    if let Some(definition) = reaction_service
        .reactions()
        .into_iter()
        .find(|r| r.id == reaction_type)
    {
        unknown_config_keys(
            reaction_service.service_id(),
            &definition.fields,
            &payload.reaction.config,
        );
    }

    // Model invariant: timer trigger XOR action connection.
    let timer_config = if payload.trigger.service_id() == "timer" {
        if payload.trigger.connection_id.is_some() {
            tracing::warn!("Area creation rejected: timer trigger with a connection");
            return Err(StatusCode::BAD_REQUEST);
        }
        let kind = action_type.split_once('.').map(|(_, k)| k).unwrap_or("");
        Some(resolver::timer_config_from_fields(
            kind,
            &payload.trigger.config,
        ))
    } else {
        if action_service.requires_oauth() {
            let Some(connection_id) = payload.trigger.connection_id else {
                tracing::warn!("Area creation rejected: service trigger without a connection");
                return Err(StatusCode::BAD_REQUEST);
            };
            // The connection must belong to the trigger's service.
            match state.connections.get_connection(connection_id).await {
                Ok(Some(connection)) => {
                    if connection.service_id != payload.trigger.service_id() {
                        tracing::warn!(
                            "Area creation rejected: connection {} belongs to '{}', trigger is '{}'",
                            connection_id,
                            connection.service_id,
                            payload.trigger.service_id()
                        );
                        return Err(StatusCode::BAD_REQUEST);
                    }
                }
                Ok(None) => return Err(StatusCode::BAD_REQUEST),
                Err(e) => {
                    tracing::error!("Failed to load connection {}: {}", connection_id, e);
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }
        None
    };

    let new_area = NewArea {
        name: payload.name,
        action_type,
        action_connection_id: payload.trigger.connection_id,
        reaction_type,
        reaction_connection_id: payload.reaction.connection_id,
        workflow_data: WorkflowData {
            trigger: payload.trigger,
            reaction: payload.reaction,
        },
        timer_config,
    };

    match state.areas.create_area(new_area).await {
        Ok(area) => {
            tracing::info!("Created area {} ({})", area.id, area.name);
            Ok(Json(area))
        }
        Err(e) => {
            tracing::error!("Failed to create area: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List all Areas
///
/// GET /api/areas
async fn list_areas(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.areas.list_areas().await {
        Ok(areas) => Ok(Json(json!({ "areas": areas }))),
        Err(e) => {
            tracing::error!("Failed to list areas: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific Area by id
///
/// GET /api/areas/{id}
async fn get_area(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Area>, StatusCode> {
    match state.areas.get_area(id).await {
        Ok(Some(area)) => Ok(Json(area)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get area {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Activate or deactivate an Area
///
/// PATCH /api/areas/{id}/status
/// Body: { "active": true }
///
/// Reactivation also clears the failure counter so a circuit-broken Area
/// gets a fresh start.
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, StatusCode> {
    match state.areas.set_active(id, payload.active).await {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to update area {} status: {}", id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    if payload.active {
        if let Err(e) = state.areas.reset_failures(id).await {
            tracing::error!("Failed to reset failures for area {}: {}", id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    tracing::info!(
        "Area {} {}",
        id,
        if payload.active { "activated" } else { "deactivated" }
    );
    Ok(Json(json!({ "id": id, "active": payload.active })))
}

/// Run both polling loops once, immediately
///
/// POST /api/scheduler/poll
async fn poll_now(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let timer = match state.scheduler.poll_timer_areas_once().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Manual timer poll failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let services = match state.scheduler.poll_service_areas_once().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Manual service poll failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    Ok(Json(json!({
        "timer": stats_json(timer),
        "services": stats_json(services),
    })))
}

fn stats_json(stats: crate::runtime::TickStats) -> Value {
    json!({
        "succeeded": stats.succeeded,
        "failed": stats.failed,
        "skipped": stats.skipped,
    })
}
