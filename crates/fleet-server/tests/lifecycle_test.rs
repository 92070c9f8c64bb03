//! Fleet service lifecycle tests against a temp-file SQLite database.

use fleet_core::{
    Coordinate, CreateTaskRequest, DroneId, FleetError, FlightStatus, TaskStatus, Telemetry,
    UserId, UserRef, Velocity,
};
use fleet_server::config::Config;
use fleet_server::FleetService;

async fn setup() -> FleetService {
    let mut config = Config::default();
    config.database_path = std::env::temp_dir()
        .join(format!("fleet-lifecycle-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    config.database_max_connections = 4;
    FleetService::connect(&config).await.expect("init fleet")
}

fn task_request(user_id: UserId, drone_id: DroneId) -> CreateTaskRequest {
    CreateTaskRequest {
        user_id,
        drone_id,
        start: Coordinate::new(0.0, 0.0),
        end: Coordinate::new(1.0, 1.0),
        description: "parcel".to_string(),
    }
}

fn telemetry(status: FlightStatus) -> Telemetry {
    Telemetry {
        velocity: Velocity::new(0.0, 0.0, 0.0),
        gps: Coordinate::new(1.0, 1.0),
        altitude_m: 0.0,
        battery: 80,
        status,
    }
}

#[tokio::test]
async fn alice_delivery_scenario() {
    let fleet = setup().await;

    let alice = fleet.create_user("Alice").await.unwrap();
    let drone = fleet.create_drone("ABC123", Some(alice.id)).await.unwrap();
    assert_eq!(drone.flight_status, FlightStatus::Waiting);
    assert_eq!(drone.current_task_id, None);

    let task = fleet.create_task(&task_request(alice.id, drone.id)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Waiting);
    // Creating a task does not attach it to the drone.
    assert_eq!(fleet.get_drone(drone.id).await.unwrap().current_task_id, None);

    let assigned = fleet.assign_task(task.id).await.unwrap();
    assert_eq!(assigned.status, TaskStatus::Ongoing);
    let flying = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(flying.flight_status, FlightStatus::Ongoing);
    assert_eq!(flying.current_task_id, Some(task.id));

    let landed: Telemetry = serde_json::from_value(serde_json::json!({
        "velocity": {"x": 0.0, "y": 0.0, "z": 0.0},
        "gps": {"lat": 1.0, "lon": 1.0},
        "altitude_m": 0.0,
        "battery": 80,
        "status": "landed"
    }))
    .unwrap();
    let after = fleet.update_telemetry(drone.id, &landed).await.unwrap();
    assert_eq!(after.flight_status, FlightStatus::Completed);
    assert_eq!(after.current_task_id, None);

    let done = fleet.get_task(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
}

#[tokio::test]
async fn terminal_tasks_never_reopen() {
    let fleet = setup().await;
    let user = fleet.create_user("Bob").await.unwrap();
    let drone = fleet.create_drone("BOB-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();

    fleet.abort_task(task.id).await.unwrap();

    for result in [
        fleet.assign_task(task.id).await,
        fleet.complete_task(task.id).await,
        fleet.abort_task(task.id).await,
    ] {
        assert!(matches!(result, Err(FleetError::InvalidTransition(_))));
    }
    assert_eq!(
        fleet.get_task(task.id).await.unwrap().status,
        TaskStatus::Aborted
    );
    // Aborting a waiting task leaves the drone alone.
    let idle = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(idle.flight_status, FlightStatus::Waiting);
}

#[tokio::test]
async fn failed_assignment_changes_nothing() {
    let fleet = setup().await;
    let user = fleet.create_user("Carol").await.unwrap();
    let drone = fleet.create_drone("C-1", Some(user.id)).await.unwrap();
    let first = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    let second = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();

    fleet.assign_task(first.id).await.unwrap();
    let before = fleet.get_drone(drone.id).await.unwrap();

    let err = fleet.assign_task(second.id).await.expect_err("drone busy");
    assert!(matches!(err, FleetError::Conflict(_)));

    assert_eq!(fleet.get_drone(drone.id).await.unwrap(), before);
    assert_eq!(
        fleet.get_task(second.id).await.unwrap().status,
        TaskStatus::Waiting
    );
    assert_eq!(
        fleet.get_task(first.id).await.unwrap().status,
        TaskStatus::Ongoing
    );
}

#[tokio::test]
async fn aborted_flight_aborts_task_and_blocks_takeoff() {
    let fleet = setup().await;
    let user = fleet.create_user("Dan").await.unwrap();
    let drone = fleet.create_drone("D-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    fleet.assign_task(task.id).await.unwrap();

    let halted = fleet
        .update_telemetry(drone.id, &telemetry(FlightStatus::Aborted))
        .await
        .unwrap();
    assert_eq!(halted.flight_status, FlightStatus::Aborted);
    assert_eq!(
        fleet.get_task(task.id).await.unwrap().status,
        TaskStatus::Aborted
    );

    // A halted drone must recover on the ground before it can fly again.
    let next = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    let err = fleet.assign_task(next.id).await.expect_err("halted drone");
    assert!(matches!(err, FleetError::InvalidTransition(_)));

    fleet
        .update_telemetry(drone.id, &telemetry(FlightStatus::Waiting))
        .await
        .unwrap();
    fleet.assign_task(next.id).await.unwrap();
}

#[tokio::test]
async fn idle_report_ends_flight_and_completes_task() {
    let fleet = setup().await;
    let user = fleet.create_user("Ivy").await.unwrap();
    let drone = fleet.create_drone("I-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    fleet.assign_task(task.id).await.unwrap();

    let idle = fleet
        .update_telemetry(drone.id, &telemetry(FlightStatus::Waiting))
        .await
        .unwrap();
    assert_eq!(idle.flight_status, FlightStatus::Waiting);
    assert_eq!(idle.current_task_id, None);
    assert_eq!(idle.battery, 80);
    assert_eq!(idle.gps, Coordinate::new(1.0, 1.0));
    assert_eq!(
        fleet.get_task(task.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn complete_task_releases_drone() {
    let fleet = setup().await;
    let user = fleet.create_user("Erin").await.unwrap();
    let drone = fleet.create_drone("E-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    fleet.assign_task(task.id).await.unwrap();

    let done = fleet.complete_task(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let released = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(released.current_task_id, None);
    assert_eq!(released.flight_status, FlightStatus::Completed);
    assert!(fleet
        .drones_by_flight_status(FlightStatus::Ongoing)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invalid_telemetry_is_rejected_without_writes() {
    let fleet = setup().await;
    let drone = fleet.create_drone("F-1", None).await.unwrap();

    let mut bad = telemetry(FlightStatus::Waiting);
    bad.battery = 101;
    let err = fleet.update_telemetry(drone.id, &bad).await.expect_err("battery");
    assert!(matches!(err, FleetError::Validation(_)));

    let mut far = telemetry(FlightStatus::Waiting);
    far.gps = Coordinate::new(123.456, 0.0);
    assert!(fleet.update_telemetry(drone.id, &far).await.is_err());

    let stored = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(stored.battery, 100);
    assert_eq!(stored.gps, Coordinate::default());
}

#[tokio::test]
async fn delete_user_keeps_drones_ownerless() {
    let fleet = setup().await;
    let alice = fleet.create_user("Alice").await.unwrap();
    let drone = fleet.create_drone("A-1", Some(alice.id)).await.unwrap();
    let task = fleet.create_task(&task_request(alice.id, drone.id)).await.unwrap();

    fleet.delete_user(&UserRef::ById(alice.id)).await.unwrap();

    let orphan = fleet.get_drone(drone.id).await.unwrap();
    assert_eq!(orphan.owner_id, None);
    assert!(matches!(
        fleet.get_user(alice.id).await,
        Err(FleetError::NotFound { .. })
    ));
    // Task history survives its user.
    assert_eq!(fleet.get_task(task.id).await.unwrap().user_id, alice.id);
}

#[tokio::test]
async fn ambiguous_user_name_is_not_found() {
    let fleet = setup().await;
    fleet.create_user("Sam").await.unwrap();
    fleet.create_user("Sam").await.unwrap();

    let err = fleet
        .delete_user(&UserRef::ByName("Sam".to_string()))
        .await
        .expect_err("ambiguous");
    assert!(matches!(err, FleetError::NotFound { .. }));
    assert_eq!(fleet.list_users().await.unwrap().len(), 2);
    assert_eq!(fleet.list_user_names().await.unwrap(), vec!["Sam".to_string()]);
}

#[tokio::test]
async fn busy_drone_delete_is_refused() {
    let fleet = setup().await;
    let user = fleet.create_user("Gus").await.unwrap();
    let drone = fleet.create_drone("G-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();
    fleet.assign_task(task.id).await.unwrap();
    let before = fleet.get_drone(drone.id).await.unwrap();

    let err = fleet.delete_drone(drone.id).await.expect_err("busy");
    assert!(matches!(err, FleetError::Conflict(_)));
    assert_eq!(fleet.get_drone(drone.id).await.unwrap(), before);

    fleet.complete_task(task.id).await.unwrap();
    fleet.delete_drone(drone.id).await.unwrap();

    // Deleted drones cannot take new tasks.
    let stale = fleet.create_task(&task_request(user.id, drone.id)).await;
    assert!(matches!(stale, Err(FleetError::NotFound { .. })));
}

#[tokio::test]
async fn waiting_task_on_deleted_drone_cannot_start() {
    let fleet = setup().await;
    let user = fleet.create_user("Hal").await.unwrap();
    let drone = fleet.create_drone("H-1", Some(user.id)).await.unwrap();
    let task = fleet.create_task(&task_request(user.id, drone.id)).await.unwrap();

    fleet.delete_drone(drone.id).await.unwrap();

    let err = fleet.assign_task(task.id).await.expect_err("drone gone");
    assert!(matches!(err, FleetError::NotFound { .. }));
    // Cancelling still works and leaves the dangling drone id in place.
    let aborted = fleet.abort_task(task.id).await.unwrap();
    assert_eq!(aborted.drone_id, drone.id);
}

#[tokio::test]
async fn drone_updates_check_owner_and_uniqueness() {
    let fleet = setup().await;
    let ivy = fleet.create_user("Ivy").await.unwrap();
    let first = fleet.create_drone("I-1", None).await.unwrap();
    fleet.create_drone("I-2", None).await.unwrap();

    let rebound = fleet.update_drone(first.id, "I-1b", Some(ivy.id)).await.unwrap();
    assert_eq!(rebound.hardware_id, "I-1b");
    assert_eq!(rebound.owner_id, Some(ivy.id));

    assert!(matches!(
        fleet.update_drone(first.id, "I-2", None).await,
        Err(FleetError::Conflict(_))
    ));
    assert!(matches!(
        fleet.update_drone(first.id, "I-3", Some(UserId(999))).await,
        Err(FleetError::NotFound { .. })
    ));
    assert!(matches!(
        fleet.create_drone("  ", None).await,
        Err(FleetError::Validation(_))
    ));

    let owned = fleet.drones_by_owner_name("Ivy").await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, first.id);
}

#[tokio::test]
async fn queries_reflect_committed_state() {
    let fleet = setup().await;
    let user = fleet.create_user("Jo").await.unwrap();
    let a = fleet.create_drone("J-1", Some(user.id)).await.unwrap();
    let b = fleet.create_drone("J-2", Some(user.id)).await.unwrap();
    let task_a = fleet.create_task(&task_request(user.id, a.id)).await.unwrap();
    fleet.create_task(&task_request(user.id, b.id)).await.unwrap();
    fleet.assign_task(task_a.id).await.unwrap();

    let ongoing = fleet.drones_by_task_status(TaskStatus::Ongoing).await.unwrap();
    assert_eq!(ongoing.iter().map(|d| d.id).collect::<Vec<_>>(), vec![a.id]);

    let waiting = fleet.drones_by_task_status(TaskStatus::Waiting).await.unwrap();
    assert_eq!(waiting.iter().map(|d| d.id).collect::<Vec<_>>(), vec![b.id]);

    let idle = fleet.drones_by_flight_status(FlightStatus::Waiting).await.unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(fleet.tasks_by_status(TaskStatus::Waiting).await.unwrap().len(), 1);

    let renamed = fleet.update_user(user.id, "Joanna").await.unwrap();
    assert_eq!(renamed.name, "Joanna");
    assert!(fleet.drones_by_owner_name("Jo").await.unwrap().is_empty());
    assert_eq!(fleet.drones_by_owner_name("Joanna").await.unwrap().len(), 2);
}
