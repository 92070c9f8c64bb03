//! Core data models for the fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FleetError, FleetResult};
use crate::status::{FlightStatus, TaskStatus};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Store-assigned user identifier, stable for the user's lifetime.
    UserId
);
entity_id!(
    /// Store-assigned drone identifier. Never reused after deletion.
    DroneId
);
entity_id!(
    /// Store-assigned task identifier.
    TaskId
);

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self, field: &str) -> FleetResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(FleetError::validation(format!(
                "{field}.lat must be within [-90, 90], got {}",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(FleetError::validation(format!(
                "{field}.lon must be within [-180, 180], got {}",
                self.lon
            )));
        }
        Ok(())
    }
}

/// Velocity vector in metres per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Velocity {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A drone owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a caller names a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    ById(UserId),
    ByName(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "id {id}"),
            Self::ByName(name) => write!(f, "name '{name}'"),
        }
    }
}

/// Current state of a registered drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    /// Cleared when the owning user is deleted.
    pub owner_id: Option<UserId>,
    /// Autopilot (mavlink) identifier, unique across the fleet.
    pub hardware_id: String,
    /// Task the drone is executing; set only while that task is ongoing.
    pub current_task_id: Option<TaskId>,
    pub gps: Coordinate,
    pub velocity: Velocity,
    pub altitude_m: f64,
    /// Charge level, 0-100.
    pub battery: u8,
    pub flight_status: FlightStatus,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Drone {
    pub fn is_flying(&self) -> bool {
        self.flight_status.is_flying()
    }
}

/// A delivery assigned to a drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    /// May dangle once the drone has been deleted.
    pub drone_id: DroneId,
    pub start: Coordinate,
    pub end: Coordinate,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Telemetry sample for one drone, already decoded from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub velocity: Velocity,
    pub gps: Coordinate,
    #[serde(alias = "altitude")]
    pub altitude_m: f64,
    pub battery: u8,
    pub status: FlightStatus,
}

impl Telemetry {
    pub fn validate(&self) -> FleetResult<()> {
        self.gps.validate("gps")?;
        if !self.velocity.is_finite() {
            return Err(FleetError::validation("velocity components must be finite"));
        }
        if !self.altitude_m.is_finite() {
            return Err(FleetError::validation("altitude must be finite"));
        }
        if self.battery > 100 {
            return Err(FleetError::validation(format!(
                "battery must be within [0, 100], got {}",
                self.battery
            )));
        }
        Ok(())
    }
}

// ========== REQUESTS ==========

/// Request to create a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    #[serde(alias = "userName", alias = "username")]
    pub name: String,
}

/// Request to rename a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(alias = "userName", alias = "username")]
    pub name: String,
}

/// Request to register a drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDroneRequest {
    #[serde(alias = "mavlinkId", alias = "mavlink_id")]
    pub hardware_id: String,
    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<UserId>,
}

/// Request to re-bind a drone's hardware id or owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDroneRequest {
    #[serde(alias = "mavlinkId", alias = "mavlink_id")]
    pub hardware_id: String,
    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<UserId>,
}

/// Request to create a delivery task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(alias = "userId")]
    pub user_id: UserId,
    #[serde(alias = "droneId")]
    pub drone_id: DroneId,
    pub start: Coordinate,
    pub end: Coordinate,
    #[serde(default)]
    pub description: String,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> FleetResult<()> {
        self.start.validate("start")?;
        self.end.validate("end")
    }
}

/// Trimmed, non-empty display name.
pub fn normalize_name(name: &str) -> FleetResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FleetError::validation("user name must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Trimmed, non-empty hardware identifier.
pub fn normalize_hardware_id(hardware_id: &str) -> FleetResult<String> {
    let trimmed = hardware_id.trim();
    if trimmed.is_empty() {
        return Err(FleetError::validation("hardware id must not be empty"));
    }
    Ok(trimmed.to_string())
}
