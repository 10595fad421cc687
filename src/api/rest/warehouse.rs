use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::yard::{self, YardCommand};
use crate::error::AppError;
use crate::models::warehouse::{Gate, QueueItem};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/warehouse/queue/:location_id", get(queue))
        .route("/warehouse/arrived/:order_id", post(arrived))
        .route("/warehouse/assign-gate/:item_id", put(assign_gate))
        .route("/warehouse/start-loading/:item_id", put(start_loading))
        .route("/warehouse/complete-loading/:item_id", put(complete_loading))
        .route(
            "/warehouse/gates/:location_id",
            get(list_gates).post(create_gate),
        )
}

#[derive(Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub include_completed: bool,
}

#[derive(Deserialize)]
pub struct AssignGateRequest {
    pub gate_id: Uuid,
    pub instructions: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateGateRequest {
    pub gate_number: String,
}

async fn queue(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<Uuid>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    let items = yard::queue_for_location(&state, location_id, query.include_completed)?;
    Ok(Json(items))
}

async fn arrived(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let item = yard::submit_for_item(&state, YardCommand::Arrive { order_id }).await?;
    Ok(Json(item))
}

async fn assign_gate(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<AssignGateRequest>,
) -> Result<Json<QueueItem>, AppError> {
    let instructions = payload
        .instructions
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    let item = yard::submit_for_item(
        &state,
        YardCommand::AssignGate {
            item_id,
            gate_id: payload.gate_id,
            instructions,
        },
    )
    .await?;
    Ok(Json(item))
}

async fn start_loading(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let item = yard::submit_for_item(&state, YardCommand::StartLoading { item_id }).await?;
    Ok(Json(item))
}

async fn complete_loading(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let item = yard::submit_for_item(&state, YardCommand::CompleteLoading { item_id }).await?;
    Ok(Json(item))
}

async fn list_gates(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<Gate>>, AppError> {
    Ok(Json(yard::gates_for_location(&state, location_id)?))
}

async fn create_gate(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<CreateGateRequest>,
) -> Result<Json<Gate>, AppError> {
    let gate = yard::submit_for_gate(
        &state,
        YardCommand::CreateGate {
            location_id,
            gate_number: payload.gate_number,
        },
    )
    .await?;
    Ok(Json(gate))
}
