use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Assigned,
    AtWarehouse,
    Loading,
    Loaded,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Pending, Assigned | AtWarehouse | Cancelled)
                | (Assigned, Pending | AtWarehouse | Cancelled)
                | (AtWarehouse, Pending | Assigned | Loading | Cancelled)
                | (Loading, Loaded)
                | (Loaded, InTransit)
                | (InTransit, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Assigned => "Assigned",
            OrderStatus::AtWarehouse => "AtWarehouse",
            OrderStatus::Loading => "Loading",
            OrderStatus::Loaded => "Loaded",
            OrderStatus::InTransit => "InTransit",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryPoint {
    pub location_id: Uuid,
    /// 1-based position in the drop-off route.
    pub sequence: u32,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub pickup_location_id: Uuid,
    pub delivery_points: Vec<DeliveryPoint>,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn references_location(&self, location_id: Uuid) -> bool {
        self.pickup_location_id == location_id
            || self
                .delivery_points
                .iter()
                .any(|point| point.location_id == location_id)
    }
}
