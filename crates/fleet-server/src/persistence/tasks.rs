//! Task persistence operations.

use chrono::{DateTime, Utc};
use fleet_core::{
    Coordinate, CreateTaskRequest, DroneId, EntityKind, FleetError, FleetResult, StatusMachine,
    Task, TaskId, TaskStatus, TransitionError, UserId,
};
use sqlx::SqliteConnection;

use super::{db_error, format_timestamp, parse_timestamp};

const TASK_COLUMNS: &str = "id, user_id, drone_id, start_lat, start_lon, end_lat, end_lon, \
     description, status, created_at, updated_at";

/// Insert a new waiting task.
pub async fn insert_task(
    conn: &mut SqliteConnection,
    request: &CreateTaskRequest,
    now: DateTime<Utc>,
) -> FleetResult<Task> {
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (user_id, drone_id, start_lat, start_lon, end_lat, end_lon, description, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(request.user_id.value())
    .bind(request.drone_id.value())
    .bind(request.start.lat)
    .bind(request.start.lon)
    .bind(request.end.lat)
    .bind(request.end.lon)
    .bind(&request.description)
    .bind(TaskStatus::Waiting.as_str())
    .bind(format_timestamp(now))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(Task {
        id: TaskId(result.last_insert_rowid()),
        user_id: request.user_id,
        drone_id: request.drone_id,
        start: request.start,
        end: request.end,
        description: request.description.clone(),
        status: TaskStatus::Waiting,
        created_at: now,
        updated_at: now,
    })
}

/// Load a task by id.
pub async fn fetch_task(conn: &mut SqliteConnection, id: TaskId) -> FleetResult<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"
    ))
    .bind(id.value())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    row.map(Task::try_from).transpose()
}

/// Load all tasks ordered by id.
pub async fn list_tasks(conn: &mut SqliteConnection) -> FleetResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Task::try_from).collect()
}

/// Tasks currently in `status`.
pub async fn tasks_by_status(
    conn: &mut SqliteConnection,
    status: TaskStatus,
) -> FleetResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY id"
    ))
    .bind(status.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(Task::try_from).collect()
}

/// Persist a task's status if it is still `expected`.
pub async fn save_task_status(
    conn: &mut SqliteConnection,
    next: &Task,
    expected: TaskStatus,
) -> FleetResult<()> {
    let result = sqlx::query(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
    )
    .bind(next.status.as_str())
    .bind(format_timestamp(next.updated_at))
    .bind(next.id.value())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(TransitionError::new(
            EntityKind::Task,
            expected.as_str(),
            next.status.as_str(),
        )
        .with_detail("task changed concurrently")
        .into());
    }
    Ok(())
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    user_id: i64,
    drone_id: i64,
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
    description: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = FleetError;

    fn try_from(row: TaskRow) -> FleetResult<Self> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| FleetError::unavailable(format!("corrupt task {} row: {e}", row.id)))?;

        Ok(Task {
            id: TaskId(row.id),
            user_id: UserId(row.user_id),
            drone_id: DroneId(row.drone_id),
            start: Coordinate::new(row.start_lat, row.start_lon),
            end: Coordinate::new(row.end_lat, row.end_lon),
            description: row.description,
            status,
            created_at: parse_timestamp("tasks.created_at", &row.created_at)?,
            updated_at: parse_timestamp("tasks.updated_at", &row.updated_at)?,
        })
    }
}
