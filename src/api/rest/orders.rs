use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{self, NewOrder};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/driver", put(assign_driver))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/delivery-points", put(resequence))
        .route(
            "/orders/:id/delivery-points/:sequence/delivered",
            put(mark_delivered),
        )
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub reference: String,
    pub pickup_location_id: Uuid,
    #[serde(default)]
    pub delivery_location_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct ResequenceRequest {
    pub location_ids: Vec<Uuid>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::create_order(
        &state,
        NewOrder {
            reference: payload.reference,
            pickup_location_id: payload.pickup_location_id,
            delivery_location_ids: payload.delivery_location_ids,
        },
    )?;

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    Json(lifecycle::list_orders(&state, query.status))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::get_order(&state, id)?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::assign_driver(&state, id, payload.driver_id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::update_status(&state, id, payload.status)?))
}

async fn resequence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResequenceRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::resequence_delivery_points(
        &state,
        id,
        payload.location_ids,
    )?))
}

async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path((id, sequence)): Path<(Uuid, u32)>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::mark_delivered(&state, id, sequence)?))
}
