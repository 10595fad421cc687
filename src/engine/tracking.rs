use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{is_valid_coordinate, path_length_km};
use crate::models::event::LiveEvent;
use crate::models::gps::{GpsPoint, GpsReport, TrackSummary};
use crate::state::AppState;

pub fn validate_report(state: &AppState, report: &GpsReport) -> Result<(), AppError> {
    if !is_valid_coordinate(report.latitude, report.longitude) {
        return Err(AppError::BadRequest(format!(
            "invalid coordinate ({}, {})",
            report.latitude, report.longitude
        )));
    }

    if let Some(accuracy) = report.accuracy {
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(AppError::BadRequest("accuracy must be >= 0".to_string()));
        }
    }

    if let Some(speed) = report.speed {
        if !speed.is_finite() || speed < 0.0 {
            return Err(AppError::BadRequest("speed must be >= 0".to_string()));
        }
    }

    if let Some(heading) = report.heading {
        if !(0.0..360.0).contains(&heading) {
            return Err(AppError::BadRequest("heading must be in [0, 360)".to_string()));
        }
    }

    if !state.users.contains_key(&report.driver_id) {
        return Err(AppError::NotFound(format!(
            "driver {} not found",
            report.driver_id
        )));
    }

    if let Some(order_id) = report.order_id {
        if !state.orders.contains_key(&order_id) {
            return Err(AppError::NotFound(format!("order {} not found", order_id)));
        }
    }

    Ok(())
}

pub fn record_point(state: &AppState, report: GpsReport) -> Result<GpsPoint, AppError> {
    if let Err(err) = validate_report(state, &report) {
        state
            .metrics
            .gps_points_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(err);
    }

    Ok(append(state, report, Utc::now()))
}

/// Validates every report before storing any of them, so a single bad report
/// rejects the whole batch.
pub fn record_batch(state: &AppState, reports: Vec<GpsReport>) -> Result<Vec<GpsPoint>, AppError> {
    if reports.is_empty() {
        return Err(AppError::BadRequest("batch cannot be empty".to_string()));
    }

    let limit = state.config.max_gps_batch;
    if reports.len() > limit {
        return Err(AppError::BadRequest(format!(
            "batch of {} points exceeds limit of {limit}",
            reports.len()
        )));
    }

    for (index, report) in reports.iter().enumerate() {
        if let Err(err) = validate_report(state, report) {
            warn!(index, error = %err, "rejecting gps batch");
            state
                .metrics
                .gps_points_total
                .with_label_values(&["rejected"])
                .inc_by(reports.len() as u64);
            return Err(match err {
                AppError::BadRequest(msg) => AppError::BadRequest(format!("point {index}: {msg}")),
                AppError::NotFound(msg) => AppError::NotFound(format!("point {index}: {msg}")),
                other => other,
            });
        }
    }

    let received_at = Utc::now();
    let points = reports
        .into_iter()
        .map(|report| append(state, report, received_at))
        .collect::<Vec<_>>();

    debug!(count = points.len(), "gps batch stored");
    Ok(points)
}

fn append(state: &AppState, report: GpsReport, received_at: DateTime<Utc>) -> GpsPoint {
    let point = GpsPoint {
        id: Uuid::new_v4(),
        sequence: state.next_gps_sequence(),
        driver_id: report.driver_id,
        order_id: report.order_id,
        latitude: report.latitude,
        longitude: report.longitude,
        accuracy: report.accuracy,
        speed: report.speed,
        heading: report.heading,
        recorded_at: report.recorded_at.unwrap_or(received_at),
        received_at,
    };

    state
        .gps_by_driver
        .entry(point.driver_id)
        .or_default()
        .push(point.clone());

    if let Some(order_id) = point.order_id {
        state
            .gps_by_order
            .entry(order_id)
            .or_default()
            .push(point.clone());
    }

    state
        .latest_positions
        .entry(point.driver_id)
        .and_modify(|current| {
            if point.timeline_key() > current.timeline_key() {
                *current = point.clone();
            }
        })
        .or_insert_with(|| point.clone());

    state
        .metrics
        .gps_points_total
        .with_label_values(&["stored"])
        .inc();
    state.publish(LiveEvent::GpsRecorded(point.clone()));

    point
}

pub fn latest_for_driver(state: &AppState, driver_id: Uuid) -> Result<GpsPoint, AppError> {
    state
        .latest_positions
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("no position for driver {}", driver_id)))
}

/// Latest point of every driver heard from within `freshness`, newest first.
pub fn active_drivers(state: &AppState, now: DateTime<Utc>, freshness: Duration) -> Vec<GpsPoint> {
    let cutoff = now - freshness;

    let mut points: Vec<GpsPoint> = state
        .latest_positions
        .iter()
        .filter(|entry| entry.value().recorded_at >= cutoff)
        .map(|entry| entry.value().clone())
        .collect();

    points.sort_by(|a, b| b.timeline_key().cmp(&a.timeline_key()));
    points
}

pub fn order_track(state: &AppState, order_id: Uuid) -> Result<Vec<GpsPoint>, AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {} not found", order_id)));
    }

    let mut points = state
        .gps_by_order
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    points.sort_by_key(GpsPoint::timeline_key);
    Ok(points)
}

pub fn driver_track(
    state: &AppState,
    driver_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<GpsPoint>, AppError> {
    if !state.users.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {} not found", driver_id)));
    }

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest("from must not be after to".to_string()));
        }
    }

    let mut points: Vec<GpsPoint> = state
        .gps_by_driver
        .get(&driver_id)
        .map(|entry| {
            entry
                .value()
                .iter()
                .filter(|point| from.is_none_or(|from| point.recorded_at >= from))
                .filter(|point| to.is_none_or(|to| point.recorded_at <= to))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    points.sort_by_key(GpsPoint::timeline_key);
    Ok(points)
}

pub fn order_track_summary(state: &AppState, order_id: Uuid) -> Result<TrackSummary, AppError> {
    let points = order_track(state, order_id)?;
    let positions: Vec<_> = points.iter().map(GpsPoint::position).collect();

    Ok(TrackSummary {
        order_id,
        points: points.len(),
        first_recorded_at: points.first().map(|point| point.recorded_at),
        last_recorded_at: points.last().map(|point| point.recorded_at),
        distance_km: path_length_km(&positions),
    })
}
