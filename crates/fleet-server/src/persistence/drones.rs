//! Drone persistence operations.

use chrono::{DateTime, Utc};
use fleet_core::{
    Coordinate, Drone, DroneId, EntityKind, FleetError, FleetResult, FlightStatus, StatusMachine,
    TaskId, TaskStatus, TransitionError, UserId, Velocity,
};
use sqlx::SqliteConnection;

use super::{db_error, format_timestamp, parse_timestamp};

const DRONE_COLUMNS: &str = "d.id, d.owner_id, d.hardware_id, d.current_task_id, d.lat, d.lon, \
     d.velocity_x, d.velocity_y, d.velocity_z, d.altitude_m, d.battery, d.flight_status, \
     d.last_update, d.created_at";

/// Register a drone. It starts on the ground with no task.
pub async fn insert_drone(
    conn: &mut SqliteConnection,
    hardware_id: &str,
    owner_id: Option<UserId>,
    now: DateTime<Utc>,
) -> FleetResult<Drone> {
    let result = sqlx::query(
        r#"
        INSERT INTO drones (owner_id, hardware_id, flight_status, last_update, created_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
    )
    .bind(owner_id.map(UserId::value))
    .bind(hardware_id)
    .bind(FlightStatus::Waiting.as_str())
    .bind(format_timestamp(now))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(Drone {
        id: DroneId(result.last_insert_rowid()),
        owner_id,
        hardware_id: hardware_id.to_string(),
        current_task_id: None,
        gps: Coordinate::default(),
        velocity: Velocity::default(),
        altitude_m: 0.0,
        battery: 100,
        flight_status: FlightStatus::Waiting,
        last_update: now,
        created_at: now,
    })
}

/// Load a drone by id.
pub async fn fetch_drone(conn: &mut SqliteConnection, id: DroneId) -> FleetResult<Option<Drone>> {
    let row = sqlx::query_as::<_, DroneRow>(&format!(
        "SELECT {DRONE_COLUMNS} FROM drones d WHERE d.id = ?1"
    ))
    .bind(id.value())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    row.map(Drone::try_from).transpose()
}

/// Whether another drone already uses `hardware_id`.
pub async fn hardware_id_in_use(
    conn: &mut SqliteConnection,
    hardware_id: &str,
    except: Option<DroneId>,
) -> FleetResult<bool> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM drones WHERE hardware_id = ?1 AND id IS NOT ?2")
            .bind(hardware_id)
            .bind(except.map(DroneId::value))
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error)?;

    Ok(count > 0)
}

/// Load all drones ordered by id.
pub async fn list_drones(conn: &mut SqliteConnection) -> FleetResult<Vec<Drone>> {
    let rows = sqlx::query_as::<_, DroneRow>(&format!(
        "SELECT {DRONE_COLUMNS} FROM drones d ORDER BY d.id"
    ))
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Drone::try_from).collect()
}

/// Drones currently reporting `status`.
pub async fn drones_by_flight_status(
    conn: &mut SqliteConnection,
    status: FlightStatus,
) -> FleetResult<Vec<Drone>> {
    let rows = sqlx::query_as::<_, DroneRow>(&format!(
        "SELECT {DRONE_COLUMNS} FROM drones d WHERE d.flight_status = ?1 ORDER BY d.id"
    ))
    .bind(status.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Drone::try_from).collect()
}

/// Drones with at least one task in `status`.
pub async fn drones_by_task_status(
    conn: &mut SqliteConnection,
    status: TaskStatus,
) -> FleetResult<Vec<Drone>> {
    let rows = sqlx::query_as::<_, DroneRow>(&format!(
        r#"
        SELECT {DRONE_COLUMNS} FROM drones d
        WHERE EXISTS (SELECT 1 FROM tasks t WHERE t.drone_id = d.id AND t.status = ?1)
        ORDER BY d.id
        "#
    ))
    .bind(status.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Drone::try_from).collect()
}

/// Drones owned by any user named `name`.
pub async fn drones_by_owner_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> FleetResult<Vec<Drone>> {
    let rows = sqlx::query_as::<_, DroneRow>(&format!(
        r#"
        SELECT {DRONE_COLUMNS} FROM drones d
        JOIN users u ON u.id = d.owner_id
        WHERE u.name = ?1
        ORDER BY d.id
        "#
    ))
    .bind(name)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Drone::try_from).collect()
}

/// Change a drone's hardware id and owner.
pub async fn rebind_drone(
    conn: &mut SqliteConnection,
    id: DroneId,
    hardware_id: &str,
    owner_id: Option<UserId>,
) -> FleetResult<bool> {
    let result = sqlx::query("UPDATE drones SET hardware_id = ?1, owner_id = ?2 WHERE id = ?3")
        .bind(hardware_id)
        .bind(owner_id.map(UserId::value))
        .bind(id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}

/// Persist a drone's state if it still matches `expected`.
///
/// Compare-and-swap on flight status and current task: a drone that moved
/// underneath the caller is reported as an invalid transition and left as is.
pub async fn save_drone_state(
    conn: &mut SqliteConnection,
    next: &Drone,
    expected: &Drone,
) -> FleetResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE drones SET
            current_task_id = ?1,
            lat = ?2, lon = ?3,
            velocity_x = ?4, velocity_y = ?5, velocity_z = ?6,
            altitude_m = ?7, battery = ?8,
            flight_status = ?9, last_update = ?10
        WHERE id = ?11 AND flight_status = ?12 AND current_task_id IS ?13
        "#,
    )
    .bind(next.current_task_id.map(TaskId::value))
    .bind(next.gps.lat)
    .bind(next.gps.lon)
    .bind(next.velocity.x)
    .bind(next.velocity.y)
    .bind(next.velocity.z)
    .bind(next.altitude_m)
    .bind(i64::from(next.battery))
    .bind(next.flight_status.as_str())
    .bind(format_timestamp(next.last_update))
    .bind(next.id.value())
    .bind(expected.flight_status.as_str())
    .bind(expected.current_task_id.map(TaskId::value))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(TransitionError::new(
            EntityKind::Drone,
            expected.flight_status.as_str(),
            next.flight_status.as_str(),
        )
        .with_detail("drone changed concurrently")
        .into());
    }
    Ok(())
}

/// Detach every drone from `owner_id`. Returns how many were released.
pub async fn clear_owner(conn: &mut SqliteConnection, owner_id: UserId) -> FleetResult<u64> {
    let result = sqlx::query("UPDATE drones SET owner_id = NULL WHERE owner_id = ?1")
        .bind(owner_id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected())
}

/// Delete a drone by id. Task rows are left in place.
pub async fn delete_drone(conn: &mut SqliteConnection, id: DroneId) -> FleetResult<bool> {
    let result = sqlx::query("DELETE FROM drones WHERE id = ?1")
        .bind(id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct DroneRow {
    id: i64,
    owner_id: Option<i64>,
    hardware_id: String,
    current_task_id: Option<i64>,
    lat: f64,
    lon: f64,
    velocity_x: f64,
    velocity_y: f64,
    velocity_z: f64,
    altitude_m: f64,
    battery: i64,
    flight_status: String,
    last_update: String,
    created_at: String,
}

impl TryFrom<DroneRow> for Drone {
    type Error = FleetError;

    fn try_from(row: DroneRow) -> FleetResult<Self> {
        let flight_status = row.flight_status.parse::<FlightStatus>().map_err(|e| {
            FleetError::unavailable(format!("corrupt drone {} row: {e}", row.id))
        })?;
        let battery = u8::try_from(row.battery).map_err(|_| {
            FleetError::unavailable(format!("corrupt drone {} battery: {}", row.id, row.battery))
        })?;

        Ok(Drone {
            id: DroneId(row.id),
            owner_id: row.owner_id.map(UserId),
            hardware_id: row.hardware_id,
            current_task_id: row.current_task_id.map(TaskId),
            gps: Coordinate::new(row.lat, row.lon),
            velocity: Velocity::new(row.velocity_x, row.velocity_y, row.velocity_z),
            altitude_m: row.altitude_m,
            battery,
            flight_status,
            last_update: parse_timestamp("drones.last_update", &row.last_update)?,
            created_at: parse_timestamp("drones.created_at", &row.created_at)?,
        })
    }
}
