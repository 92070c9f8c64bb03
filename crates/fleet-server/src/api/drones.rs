//! Drone API endpoints, including telemetry ingestion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::FleetService;
use fleet_core::{
    CreateDroneRequest, Drone, DroneId, FleetError, FlightStatus, TaskStatus, Telemetry,
    UpdateDroneRequest,
};

/// Optional filters for listing drones. At most one may be set.
#[derive(Debug, Default, Deserialize)]
pub struct DroneFilter {
    pub flight_status: Option<FlightStatus>,
    pub task_status: Option<TaskStatus>,
}

/// Register a drone.
pub async fn create_drone(
    State(fleet): State<Arc<FleetService>>,
    Json(req): Json<CreateDroneRequest>,
) -> ApiResult<(StatusCode, Json<Drone>)> {
    let drone = fleet.create_drone(&req.hardware_id, req.owner_id).await?;
    Ok((StatusCode::CREATED, Json(drone)))
}

pub async fn list_drones(
    State(fleet): State<Arc<FleetService>>,
    Query(filter): Query<DroneFilter>,
) -> ApiResult<Json<Vec<Drone>>> {
    let drones = match (filter.flight_status, filter.task_status) {
        (Some(_), Some(_)) => {
            return Err(FleetError::validation(
                "filter by flight_status or task_status, not both",
            )
            .into())
        }
        (Some(status), None) => fleet.drones_by_flight_status(status).await?,
        (None, Some(status)) => fleet.drones_by_task_status(status).await?,
        (None, None) => fleet.list_drones().await?,
    };
    Ok(Json(drones))
}

pub async fn get_drone(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<DroneId>,
) -> ApiResult<Json<Drone>> {
    Ok(Json(fleet.get_drone(id).await?))
}

pub async fn update_drone(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<DroneId>,
    Json(req): Json<UpdateDroneRequest>,
) -> ApiResult<Json<Drone>> {
    let drone = fleet
        .update_drone(id, &req.hardware_id, req.owner_id)
        .await?;
    Ok(Json(drone))
}

pub async fn delete_drone(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<DroneId>,
) -> ApiResult<StatusCode> {
    fleet.delete_drone(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ingest a real-time telemetry sample.
pub async fn update_telemetry(
    State(fleet): State<Arc<FleetService>>,
    Path(id): Path<DroneId>,
    Json(telemetry): Json<Telemetry>,
) -> ApiResult<Json<Drone>> {
    Ok(Json(fleet.update_telemetry(id, &telemetry).await?))
}
