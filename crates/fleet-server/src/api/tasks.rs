//! Task API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::FleetService;
use fleet_core::{CreateTaskRequest, Task, TaskId, TaskStatus};

#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Create a waiting task for a drone.
pub async fn create_task(
    State(fleet): State<Arc<FleetService>>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = fleet.create_task(&req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(fleet): State<Arc<FleetService>>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = match filter.status {
        Some(status) => fleet.tasks_by_status(status).await?,
        None => fleet.list_tasks().await?,
    };
    Ok(Json(tasks))
}

pub async fn get_task(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    Ok(Json(fleet.get_task(id).await?))
}

pub async fn assign_task(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    Ok(Json(fleet.assign_task(id).await?))
}

pub async fn complete_task(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    Ok(Json(fleet.complete_task(id).await?))
}

pub async fn abort_task(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    Ok(Json(fleet.abort_task(id).await?))
}
