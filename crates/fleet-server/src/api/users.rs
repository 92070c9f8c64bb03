//! User API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::FleetService;
use fleet_core::{CreateUserRequest, Drone, UpdateUserRequest, User, UserId, UserRef};

/// Create a new user.
pub async fn create_user(
    State(fleet): State<Arc<FleetService>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = fleet.create_user(&req.name).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(fleet): State<Arc<FleetService>>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(fleet.list_users().await?))
}

pub async fn list_user_names(
    State(fleet): State<Arc<FleetService>>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(fleet.list_user_names().await?))
}

pub async fn get_user(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<UserId>,
) -> ApiResult<Json<User>> {
    Ok(Json(fleet.get_user(id).await?))
}

/// Rename a user.
pub async fn update_user(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<UserId>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(fleet.update_user(id, &req.name).await?))
}

/// Delete a user by id (all digits) or by name.
pub async fn delete_user(
    State(fleet): State<Arc<FleetService>>,
    Path(identifier): Path<String>,
) -> ApiResult<StatusCode> {
    fleet.delete_user(&parse_user_ref(&identifier)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drones owned by users with this name.
pub async fn drones_by_owner_name(
    State(fleet): State<Arc<FleetService>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<Drone>>> {
    Ok(Json(fleet.drones_by_owner_name(&name).await?))
}

pub fn parse_user_ref(identifier: &str) -> UserRef {
    let trimmed = identifier.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(id) = trimmed.parse::<i64>() {
            return UserRef::ById(UserId(id));
        }
    }
    UserRef::ByName(trimmed.to_string())
}
