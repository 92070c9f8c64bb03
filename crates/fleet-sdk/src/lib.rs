//! Fleet SDK - typed client for the fleet monitor server
//!
//! Wraps the REST API so operators and drone gateways can manage users,
//! drones and tasks and push telemetry without hand-building requests.

pub mod client;

pub use client::{ClientError, FleetClient};
pub use fleet_core::{
    Coordinate, CreateTaskRequest, Drone, DroneId, ErrorKind, FlightStatus, Task, TaskId,
    TaskStatus, Telemetry, User, UserId, Velocity,
};
