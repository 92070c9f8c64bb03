//! Cross-entity lifecycle planning.
//!
//! Each planner takes the current snapshot of the entities an operation
//! touches and returns their next state, or the reason the operation must
//! be refused. Nothing here performs I/O; the server persists the returned
//! snapshots in a single transaction.

use chrono::{DateTime, Utc};

use crate::error::{EntityKind, FleetError, FleetResult, TransitionError};
use crate::models::{Drone, Task, Telemetry};
use crate::status::{FlightStatus, StatusMachine, TaskStatus};

/// Next state of a task and its drone after assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub task: Task,
    pub drone: Drone,
}

/// Next state of a drone after a telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryOutcome {
    pub drone: Drone,
    /// The drone's ongoing task, when the sample ended it.
    pub finished_task: Option<Task>,
}

/// Next state of a task moved to a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct Finish {
    pub task: Task,
    /// Present only when the drone was released.
    pub drone: Option<Drone>,
}

/// Start `task` on `drone`.
///
/// `current` is the task the drone's `current_task_id` points at, if any.
pub fn plan_assignment(
    task: &Task,
    drone: &Drone,
    current: Option<&Task>,
    now: DateTime<Utc>,
) -> FleetResult<Assignment> {
    if task.drone_id != drone.id {
        return Err(FleetError::validation(format!(
            "task {} belongs to drone {}, not drone {}",
            task.id, task.drone_id, drone.id
        )));
    }

    let task_status = task.status.apply(TaskStatus::Ongoing)?;

    if let Some(busy) = current.filter(|c| c.id != task.id && !c.status.is_terminal()) {
        return Err(FleetError::conflict(format!(
            "drone {} is already busy with task {} ({})",
            drone.id, busy.id, busy.status
        )));
    }

    let flight_status = drone.flight_status.apply(FlightStatus::Ongoing)?;

    let mut next_task = task.clone();
    next_task.status = task_status;
    next_task.updated_at = now;

    let mut next_drone = drone.clone();
    next_drone.current_task_id = Some(task.id);
    next_drone.flight_status = flight_status;

    Ok(Assignment {
        task: next_task,
        drone: next_drone,
    })
}

/// Apply a telemetry sample to `drone`.
///
/// A drone may only report flying while its current task is ongoing. Any
/// other status ends that task: aborted flights abort it, everything else
/// completes it.
pub fn plan_telemetry(
    drone: &Drone,
    current: Option<&Task>,
    telemetry: &Telemetry,
    now: DateTime<Utc>,
) -> FleetResult<TelemetryOutcome> {
    telemetry.validate()?;
    let flight_status = drone.flight_status.apply(telemetry.status)?;

    let ongoing = current.filter(|task| {
        task.status == TaskStatus::Ongoing && drone.current_task_id == Some(task.id)
    });

    let mut next_drone = drone.clone();
    next_drone.gps = telemetry.gps;
    next_drone.velocity = telemetry.velocity;
    next_drone.altitude_m = telemetry.altitude_m;
    next_drone.battery = telemetry.battery;
    next_drone.flight_status = flight_status;
    next_drone.last_update = now;

    if flight_status.is_flying() {
        if ongoing.is_none() {
            return Err(TransitionError::new(
                EntityKind::Drone,
                drone.flight_status.as_str(),
                flight_status.as_str(),
            )
            .with_detail("no ongoing task assigned")
            .into());
        }
        return Ok(TelemetryOutcome {
            drone: next_drone,
            finished_task: None,
        });
    }

    next_drone.current_task_id = None;
    let finished_task = match ongoing {
        Some(task) => {
            let mut finished = task.clone();
            finished.status = task.status.apply(flight_status.task_outcome())?;
            finished.updated_at = now;
            Some(finished)
        }
        None => None,
    };

    Ok(TelemetryOutcome {
        drone: next_drone,
        finished_task,
    })
}

/// Move `task` to the terminal `outcome` and release its drone.
///
/// `drone` is the task's drone if it still exists. It is only touched when
/// it still points at the task.
pub fn plan_finish(
    task: &Task,
    drone: Option<&Drone>,
    outcome: TaskStatus,
    now: DateTime<Utc>,
) -> FleetResult<Finish> {
    let status = task.status.apply(outcome)?;

    let mut next_task = task.clone();
    next_task.status = status;
    next_task.updated_at = now;

    let next_drone = match drone.filter(|d| d.current_task_id == Some(task.id)) {
        Some(drone) => {
            let mut released = drone.clone();
            released.current_task_id = None;
            if let Some(flight_status) = FlightStatus::after_task(status) {
                released.flight_status = drone.flight_status.apply(flight_status)?;
            }
            Some(released)
        }
        None => None,
    };

    Ok(Finish {
        task: next_task,
        drone: next_drone,
    })
}
