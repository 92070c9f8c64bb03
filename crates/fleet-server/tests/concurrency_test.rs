//! Concurrent operations must leave the fleet consistent.

use fleet_core::{
    Coordinate, CreateTaskRequest, FleetError, FlightStatus, TaskStatus, Telemetry, Velocity,
};
use fleet_server::config::Config;
use fleet_server::persistence::init_database;
use fleet_server::FleetService;
use std::sync::Arc;
use std::time::Duration;

async fn setup() -> Arc<FleetService> {
    let mut config = Config::default();
    config.database_path = std::env::temp_dir()
        .join(format!("fleet-concurrency-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    config.database_max_connections = 5;
    Arc::new(FleetService::connect(&config).await.expect("init fleet"))
}

fn telemetry(status: FlightStatus, battery: u8) -> Telemetry {
    Telemetry {
        velocity: Velocity::new(3.0, 0.0, 0.0),
        gps: Coordinate::new(0.5, 0.5),
        altitude_m: 50.0,
        battery,
        status,
    }
}

/// Every flying drone points at an ongoing task that points back at it,
/// and every ongoing task is referenced by its drone.
async fn assert_consistent(fleet: &FleetService) {
    let drones = fleet.list_drones().await.unwrap();
    let tasks = fleet.list_tasks().await.unwrap();

    for drone in &drones {
        if drone.flight_status == FlightStatus::Ongoing {
            let task_id = drone.current_task_id.expect("flying drone has a task");
            let task = tasks.iter().find(|t| t.id == task_id).expect("task exists");
            assert_eq!(task.status, TaskStatus::Ongoing);
        }
        if let Some(task_id) = drone.current_task_id {
            let task = tasks.iter().find(|t| t.id == task_id).expect("task exists");
            assert_eq!(task.status, TaskStatus::Ongoing);
            assert_eq!(task.drone_id, drone.id);
        }
    }
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Ongoing) {
        let drone = drones
            .iter()
            .find(|d| d.id == task.drone_id)
            .expect("ongoing task has a drone");
        assert_eq!(drone.current_task_id, Some(task.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_assignments_pick_one_winner() {
    let fleet = setup().await;
    let user = fleet.create_user("Racer").await.unwrap();
    let drone = fleet.create_drone("RACE-1", Some(user.id)).await.unwrap();

    let mut task_ids = Vec::new();
    for _ in 0..6 {
        let task = fleet
            .create_task(&CreateTaskRequest {
                user_id: user.id,
                drone_id: drone.id,
                start: Coordinate::new(0.0, 0.0),
                end: Coordinate::new(1.0, 1.0),
                description: String::new(),
            })
            .await
            .unwrap();
        task_ids.push(task.id);
    }

    let handles: Vec<_> = task_ids
        .iter()
        .map(|id| {
            let fleet = fleet.clone();
            let id = *id;
            tokio::spawn(async move { fleet.assign_task(id).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(FleetError::Conflict(_)) | Err(FleetError::InvalidTransition(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(
        fleet.tasks_by_status(TaskStatus::Ongoing).await.unwrap().len(),
        1
    );
    assert_consistent(&fleet).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn landing_races_with_completion() {
    let fleet = setup().await;
    let user = fleet.create_user("Pilot").await.unwrap();

    let mut pairs = Vec::new();
    for i in 0..4 {
        let drone = fleet
            .create_drone(&format!("LAND-{i}"), Some(user.id))
            .await
            .unwrap();
        let task = fleet
            .create_task(&CreateTaskRequest {
                user_id: user.id,
                drone_id: drone.id,
                start: Coordinate::new(0.0, 0.0),
                end: Coordinate::new(1.0, 1.0),
                description: format!("delivery {i}"),
            })
            .await
            .unwrap();
        fleet.assign_task(task.id).await.unwrap();
        pairs.push((drone.id, task.id));
    }

    let mut handles = Vec::new();
    for (drone_id, task_id) in pairs.iter().copied() {
        let landing = {
            let fleet = fleet.clone();
            tokio::spawn(async move {
                fleet
                    .update_telemetry(drone_id, &telemetry(FlightStatus::Completed, 40))
                    .await
                    .map(|_| ())
            })
        };
        let completion = {
            let fleet = fleet.clone();
            tokio::spawn(async move { fleet.complete_task(task_id).await.map(|_| ()) })
        };
        handles.push(landing);
        handles.push(completion);
    }

    for handle in handles {
        // Whichever side loses sees an invalid transition; nothing else.
        match handle.await.unwrap() {
            Ok(()) | Err(FleetError::InvalidTransition(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    for (drone_id, task_id) in pairs {
        assert_eq!(
            fleet.get_task(task_id).await.unwrap().status,
            TaskStatus::Completed
        );
        let drone = fleet.get_drone(drone_id).await.unwrap();
        assert_eq!(drone.current_task_id, None);
        assert_eq!(drone.flight_status, FlightStatus::Completed);
    }
    assert_consistent(&fleet).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn telemetry_streams_for_many_drones() {
    let fleet = setup().await;
    let user = fleet.create_user("Fleet").await.unwrap();

    let mut drone_ids = Vec::new();
    for i in 0..8 {
        let drone = fleet
            .create_drone(&format!("STREAM-{i}"), Some(user.id))
            .await
            .unwrap();
        drone_ids.push(drone.id);
    }

    let handles: Vec<_> = drone_ids
        .iter()
        .copied()
        .map(|drone_id| {
            let fleet = fleet.clone();
            tokio::spawn(async move {
                for battery in (60..=100u8).rev().step_by(10) {
                    fleet
                        .update_telemetry(drone_id, &telemetry(FlightStatus::Waiting, battery))
                        .await?;
                }
                Ok::<_, FleetError>(())
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for drone_id in drone_ids {
        let drone = fleet.get_drone(drone_id).await.unwrap();
        assert_eq!(drone.battery, 60);
        assert_eq!(drone.altitude_m, 50.0);
    }
    assert_consistent(&fleet).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn locked_database_times_out_as_unavailable() {
    let path = std::env::temp_dir()
        .join(format!("fleet-locked-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    let db = init_database(&path, 4, Duration::from_secs(5))
        .await
        .expect("init db");

    let fleet = FleetService::new(db.clone(), Duration::from_secs(10));
    let user = fleet.create_user("Blocked").await.unwrap();
    let drone = fleet.create_drone("LOCK-1", Some(user.id)).await.unwrap();
    let before = fleet.get_drone(drone.id).await.unwrap();

    // Another writer holds the database while the update runs.
    let mut holder = db.pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *holder)
        .await
        .unwrap();

    let hurried = FleetService::new(db.clone(), Duration::from_millis(50));
    let err = hurried
        .update_telemetry(drone.id, &telemetry(FlightStatus::Waiting, 42))
        .await
        .expect_err("write must not get through");
    assert!(matches!(err, FleetError::Unavailable(_)), "got {err:?}");
    assert!(err.is_retryable());

    sqlx::query("ROLLBACK")
        .execute(&mut *holder)
        .await
        .unwrap();
    drop(holder);

    let after = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.battery, 100);
}
