use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Admin,
    Dispatcher,
    Driver,
    WarehouseOperator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Mobile devices bound to this account. A device belongs to one user.
    pub device_ids: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
