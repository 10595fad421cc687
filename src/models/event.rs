use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::gps::GpsPoint;
use crate::models::order::OrderStatus;
use crate::models::warehouse::{Gate, QueueItem};

/// Pushed to live feed subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveEvent {
    GpsRecorded(GpsPoint),
    QueueItemUpdated(QueueItem),
    GateUpdated(Gate),
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
}
