//! Task and drone status state machines.
//!
//! Both machines are pure: they only answer whether a move is legal and
//! return the next state. Cross-entity rules (a flying drone needs an
//! ongoing task, landing finishes the task) live in [`crate::lifecycle`].
//!
//! The two enums share their labels (`waiting`, `ongoing`, `completed`,
//! `aborted`) but are distinct types. A task status tracks delivery
//! progress; a flight status tracks the physical condition of the aircraft.

use crate::error::{EntityKind, TransitionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Common contract of the fleet's finite-state models.
pub trait StatusMachine: Copy + Eq + fmt::Debug {
    const ENTITY: EntityKind;

    fn as_str(self) -> &'static str;

    fn can_transition(self, next: Self) -> bool;

    fn is_terminal(self) -> bool;

    /// Returns `next` when the move is legal, otherwise a descriptive error.
    fn apply(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(TransitionError::new(Self::ENTITY, self.as_str(), next.as_str()))
        }
    }
}

/// Error returned when parsing a status label fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {entity} status: {value}")]
pub struct ParseStatusError {
    pub entity: EntityKind,
    pub value: String,
}

/// Delivery progress of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet started.
    #[default]
    Waiting,
    /// Assigned to its drone and in flight.
    Ongoing,
    /// Delivered.
    Completed,
    /// Cancelled or failed.
    Aborted,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [Self::Waiting, Self::Ongoing, Self::Completed, Self::Aborted];
}

impl StatusMachine for TaskStatus {
    const ENTITY: EntityKind = EntityKind::Task;

    fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Ongoing)
                | (Self::Waiting, Self::Aborted)
                | (Self::Ongoing, Self::Completed)
                | (Self::Ongoing, Self::Aborted)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(ParseStatusError {
                entity: EntityKind::Task,
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational condition of a drone as reported by telemetry.
///
/// Heartbeats repeat the current status, so self-transitions are legal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    /// On the ground and ready.
    #[default]
    #[serde(alias = "idle")]
    Waiting,
    /// Airborne on a mission.
    #[serde(alias = "flying")]
    Ongoing,
    /// Landed after a successful mission.
    #[serde(alias = "landed")]
    Completed,
    /// Halted: disconnected, damaged, or mission aborted.
    #[serde(alias = "lost", alias = "disconnected", alias = "damaged")]
    Aborted,
}

impl FlightStatus {
    pub const ALL: [Self; 4] = [Self::Waiting, Self::Ongoing, Self::Completed, Self::Aborted];

    pub fn is_flying(self) -> bool {
        self == Self::Ongoing
    }

    /// Flight status a drone settles in when its task ends with `outcome`.
    pub fn after_task(outcome: TaskStatus) -> Option<Self> {
        match outcome {
            TaskStatus::Completed => Some(Self::Completed),
            TaskStatus::Aborted => Some(Self::Aborted),
            TaskStatus::Waiting | TaskStatus::Ongoing => None,
        }
    }

    /// Task outcome implied by a drone leaving flight with this status.
    pub fn task_outcome(self) -> TaskStatus {
        if self == Self::Aborted {
            TaskStatus::Aborted
        } else {
            TaskStatus::Completed
        }
    }
}

impl StatusMachine for FlightStatus {
    const ENTITY: EntityKind = EntityKind::Drone;

    fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    fn can_transition(self, next: Self) -> bool {
        match self {
            Self::Waiting => next != Self::Completed,
            // Leaving flight ends the current task.
            Self::Ongoing => true,
            Self::Completed => true,
            // Recover on the ground before flying again.
            Self::Aborted => next != Self::Ongoing,
        }
    }

    fn is_terminal(self) -> bool {
        false
    }
}

impl FromStr for FlightStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" | "idle" => Ok(Self::Waiting),
            "ongoing" | "flying" => Ok(Self::Ongoing),
            "completed" | "landed" => Ok(Self::Completed),
            "aborted" | "lost" | "disconnected" | "damaged" => Ok(Self::Aborted),
            _ => Err(ParseStatusError {
                entity: EntityKind::Drone,
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
