//! User persistence operations.

use chrono::{DateTime, Utc};
use fleet_core::{FleetError, FleetResult, User, UserId};
use sqlx::SqliteConnection;

use super::{db_error, format_timestamp, parse_timestamp};

const USER_COLUMNS: &str = "id, name, created_at, updated_at";

/// Insert a new user and return it with its assigned id.
pub async fn insert_user(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> FleetResult<User> {
    let result = sqlx::query("INSERT INTO users (name, created_at, updated_at) VALUES (?1, ?2, ?2)")
        .bind(name)
        .bind(format_timestamp(now))
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(User {
        id: UserId(result.last_insert_rowid()),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    })
}

/// Load a user by id.
pub async fn fetch_user(conn: &mut SqliteConnection, id: UserId) -> FleetResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
    ))
    .bind(id.value())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    row.map(User::try_from).transpose()
}

/// Load every user carrying exactly `name`.
pub async fn find_users_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> FleetResult<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE name = ?1 ORDER BY id"
    ))
    .bind(name)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(User::try_from).collect()
}

/// Load all users ordered by id.
pub async fn list_users(conn: &mut SqliteConnection) -> FleetResult<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    rows.into_iter().map(User::try_from).collect()
}

/// Distinct user names in alphabetical order.
pub async fn list_user_names(conn: &mut SqliteConnection) -> FleetResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT name FROM users ORDER BY name")
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Rename a user. Returns false when the user does not exist.
pub async fn rename_user(
    conn: &mut SqliteConnection,
    id: UserId,
    name: &str,
    now: DateTime<Utc>,
) -> FleetResult<bool> {
    let result = sqlx::query("UPDATE users SET name = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(name)
        .bind(format_timestamp(now))
        .bind(id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}

/// Delete a user by id.
pub async fn delete_user(conn: &mut SqliteConnection, id: UserId) -> FleetResult<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = FleetError;

    fn try_from(row: UserRow) -> FleetResult<Self> {
        Ok(User {
            id: UserId(row.id),
            name: row.name,
            created_at: parse_timestamp("users.created_at", &row.created_at)?,
            updated_at: parse_timestamp("users.updated_at", &row.updated_at)?,
        })
    }
}
