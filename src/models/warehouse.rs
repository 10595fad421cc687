use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitStage {
    Waiting,
    Assigned,
    Loading,
    Completed,
}

/// A driver's visit to a warehouse, from arrival until loading completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub sequence: u64,
    pub order_id: Uuid,
    pub location_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub gate_id: Option<Uuid>,
    pub arrived_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub instructions: Option<String>,
}

impl QueueItem {
    pub fn stage(&self) -> VisitStage {
        if self.completed_at.is_some() {
            VisitStage::Completed
        } else if self.started_at.is_some() {
            VisitStage::Loading
        } else if self.gate_id.is_some() {
            VisitStage::Assigned
        } else {
            VisitStage::Waiting
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Most recent timestamp stamped on this item.
    pub fn last_stamp(&self) -> DateTime<Utc> {
        [self.assigned_at, self.started_at, self.completed_at]
            .into_iter()
            .flatten()
            .fold(self.arrived_at, |latest, stamp| latest.max(stamp))
    }
}

/// A loading bay at a warehouse location. Held by at most one queue item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub id: Uuid,
    pub location_id: Uuid,
    pub gate_number: String,
    pub is_available: bool,
    pub occupied_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Gate {
    pub fn occupy(&mut self, item_id: Uuid) {
        self.occupied_by = Some(item_id);
        self.is_available = false;
    }

    pub fn release(&mut self) {
        self.occupied_by = None;
        self.is_available = true;
    }

    pub fn is_held_by(&self, item_id: Uuid) -> bool {
        self.occupied_by == Some(item_id)
    }
}
