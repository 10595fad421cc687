use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A single position sample reported by a driver. Stored rows are never
/// mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsPoint {
    pub id: Uuid,
    /// Ingest order, used to break ties between equal `recorded_at` values.
    pub sequence: u64,
    pub driver_id: Uuid,
    pub order_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub accuracy: Option<f64>,
    /// Meters per second.
    pub speed: Option<f64>,
    /// Degrees clockwise from north, [0, 360).
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl GpsPoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }

    /// Ordering key for history queries.
    pub fn timeline_key(&self) -> (DateTime<Utc>, u64) {
        (self.recorded_at, self.sequence)
    }
}

/// Incoming position report, as sent by the mobile client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsReport {
    pub driver_id: Uuid,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub order_id: Uuid,
    pub points: usize,
    pub first_recorded_at: Option<DateTime<Utc>>,
    pub last_recorded_at: Option<DateTime<Utc>>,
    pub distance_km: f64,
}
