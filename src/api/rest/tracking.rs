use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::tracking;
use crate::error::AppError;
use crate::models::gps::{GpsPoint, GpsReport, TrackSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/gps", post(record_gps))
        .route("/tracking/gps/batch", post(record_gps_batch))
        .route("/tracking/drivers", get(active_drivers))
        .route("/tracking/driver/:id", get(driver_latest))
        .route("/tracking/driver/:id/history", get(driver_history))
        .route("/tracking/order/:id", get(order_track))
        .route("/tracking/order/:id/summary", get(order_summary))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub points: Vec<GpsReport>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub stored: usize,
    pub points: Vec<GpsPoint>,
}

#[derive(Deserialize)]
pub struct FreshnessQuery {
    pub freshness_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

async fn record_gps(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GpsReport>,
) -> Result<Json<GpsPoint>, AppError> {
    let point = tracking::record_point(&state, payload)?;
    Ok(Json(point))
}

async fn record_gps_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let points = tracking::record_batch(&state, payload.points)?;
    Ok(Json(BatchResponse {
        stored: points.len(),
        points,
    }))
}

async fn active_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FreshnessQuery>,
) -> Result<Json<Vec<GpsPoint>>, AppError> {
    let minutes = query
        .freshness_minutes
        .unwrap_or(state.config.driver_freshness_minutes);
    if minutes <= 0 {
        return Err(AppError::BadRequest("freshness_minutes must be > 0".to_string()));
    }

    let points = tracking::active_drivers(&state, Utc::now(), Duration::minutes(minutes));
    Ok(Json(points))
}

async fn driver_latest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GpsPoint>, AppError> {
    Ok(Json(tracking::latest_for_driver(&state, id)?))
}

async fn driver_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<GpsPoint>>, AppError> {
    Ok(Json(tracking::driver_track(&state, id, query.from, query.to)?))
}

async fn order_track(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GpsPoint>>, AppError> {
    Ok(Json(tracking::order_track(&state, id)?))
}

async fn order_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackSummary>, AppError> {
    Ok(Json(tracking::order_track_summary(&state, id)?))
}
