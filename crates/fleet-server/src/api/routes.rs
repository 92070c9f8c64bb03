//! REST API routes.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{drones, tasks, users};
use crate::service::FleetService;

/// Create the API router.
pub fn create_router() -> Router<Arc<FleetService>> {
    let user_routes = Router::new()
        .route("/v1/users", post(users::create_user).get(users::list_users))
        .route("/v1/users/names", get(users::list_user_names))
        .route(
            "/v1/users/by-name/:name/drones",
            get(users::drones_by_owner_name),
        )
        .route(
            "/v1/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    let drone_routes = Router::new()
        .route("/v1/drones", post(drones::create_drone).get(drones::list_drones))
        .route(
            "/v1/drones/:id",
            get(drones::get_drone)
                .put(drones::update_drone)
                .delete(drones::delete_drone),
        )
        .route("/v1/drones/:id/telemetry", put(drones::update_telemetry));

    let task_routes = Router::new()
        .route("/v1/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route("/v1/tasks/:id", get(tasks::get_task))
        .route("/v1/tasks/:id/assign", post(tasks::assign_task))
        .route("/v1/tasks/:id/complete", post(tasks::complete_task))
        .route("/v1/tasks/:id/abort", post(tasks::abort_task));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(user_routes)
        .merge(drone_routes)
        .merge(task_routes)
        .layer(TraceLayer::new_for_http())
}
