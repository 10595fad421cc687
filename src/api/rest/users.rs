use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id", get(get_user).patch(update_user))
        .route("/users/:id/devices", post(bind_device))
        .route("/users/:id/devices/:device_id", delete(unbind_device))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct BindDeviceRequest {
    pub device_id: String,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let email = payload.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(AppError::BadRequest(format!("invalid email: {}", payload.email)));
    }

    let user = User {
        id: Uuid::new_v4(),
        name,
        email: email.clone(),
        role: payload.role,
        device_ids: Vec::new(),
        active: true,
        created_at: Utc::now(),
    };

    match state.user_emails.entry(email) {
        Entry::Occupied(entry) => {
            return Err(AppError::Conflict(format!(
                "email {} already registered",
                entry.key()
            )));
        }
        Entry::Vacant(entry) => {
            entry.insert(user.id);
        }
    }

    state.users.insert(user.id, user.clone());
    info!(user_id = %user.id, role = ?user.role, "user created");

    Ok(Json(user))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Json<Vec<User>> {
    let mut users: Vec<User> = state
        .users
        .iter()
        .filter(|entry| query.role.is_none_or(|role| entry.value().role == role))
        .map(|entry| entry.value().clone())
        .collect();

    users.sort_by(|a, b| a.name.cmp(&b.name));
    Json(users)
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    Ok(Json(user.value().clone()))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let name = match payload.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    if let Some(name) = name {
        user.name = name;
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(active) = payload.active {
        user.active = active;
    }

    Ok(Json(user.clone()))
}

async fn bind_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BindDeviceRequest>,
) -> Result<Json<User>, AppError> {
    let device_id = payload.device_id.trim().to_string();
    if device_id.is_empty() {
        return Err(AppError::BadRequest("device_id cannot be empty".to_string()));
    }

    if !state.users.contains_key(&id) {
        return Err(AppError::NotFound(format!("user {} not found", id)));
    }

    match state.device_bindings.entry(device_id.clone()) {
        Entry::Occupied(entry) if *entry.get() != id => {
            return Err(AppError::Conflict(format!(
                "device {} is bound to another user",
                entry.key()
            )));
        }
        Entry::Occupied(_) => {}
        Entry::Vacant(entry) => {
            entry.insert(id);
        }
    }

    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    if !user.device_ids.contains(&device_id) {
        user.device_ids.push(device_id.clone());
        info!(user_id = %id, device_id = %device_id, "device bound");
    }

    Ok(Json(user.clone()))
}

async fn unbind_device(
    State(state): State<Arc<AppState>>,
    Path((id, device_id)): Path<(Uuid, String)>,
) -> Result<Json<User>, AppError> {
    let removed = state
        .device_bindings
        .remove_if(&device_id, |_, owner| *owner == id);
    if removed.is_none() {
        return Err(AppError::NotFound(format!(
            "device {} is not bound to user {}",
            device_id, id
        )));
    }

    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    user.device_ids.retain(|bound| bound != &device_id);
    info!(user_id = %id, device_id = %device_id, "device unbound");

    Ok(Json(user.clone()))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !email.contains(' ')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_plausible_email;

    #[test]
    fn email_shape_is_checked() {
        assert!(is_plausible_email("ops@depot.example"));
        assert!(!is_plausible_email("ops"));
        assert!(!is_plausible_email("@depot.example"));
        assert!(!is_plausible_email("ops@localhost"));
        assert!(!is_plausible_email("o ps@depot.example"));
    }
}
