//! HTTP boundary for the fleet service.

pub mod drones;
pub mod error;
mod routes;
pub mod tasks;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::service::FleetService;

pub use error::ApiError;

pub fn routes() -> Router<Arc<FleetService>> {
    routes::create_router()
}

#[cfg(test)]
mod tests;
