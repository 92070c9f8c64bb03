pub mod error;
pub mod lifecycle;
pub mod models;
pub mod status;

pub use error::{EntityKind, ErrorBody, ErrorKind, FleetError, FleetResult, TransitionError};
pub use lifecycle::{plan_assignment, plan_finish, plan_telemetry, Assignment, Finish, TelemetryOutcome};
pub use models::{
    normalize_hardware_id, normalize_name, Coordinate, CreateDroneRequest, CreateTaskRequest,
    CreateUserRequest, Drone, DroneId, Task, TaskId, Telemetry, UpdateDroneRequest,
    UpdateUserRequest, User, UserId, UserRef, Velocity,
};
pub use status::{FlightStatus, ParseStatusError, StatusMachine, TaskStatus};
