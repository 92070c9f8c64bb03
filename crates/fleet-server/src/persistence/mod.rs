//! Persistence layer for the fleet server.
//!
//! SQLite-backed storage for users, drones and tasks. Every function takes a
//! `&mut SqliteConnection` so callers decide whether it runs inside a
//! transaction or on a plain pooled connection.

pub mod db;
pub mod drones;
pub mod tasks;
pub mod users;

pub use db::{init_database, Database};

use chrono::{DateTime, Utc};
use fleet_core::{FleetError, FleetResult};

/// Classify a driver error into the fleet's error kinds.
pub fn db_error(err: sqlx::Error) -> FleetError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return FleetError::conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return FleetError::conflict(format!(
                    "referenced entity is missing: {}",
                    db_err.message()
                ));
            }
            // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(5) | Some(6)) {
                return FleetError::unavailable(format!("database busy: {}", db_err.message()));
            }
            FleetError::unavailable(format!("database error: {}", db_err.message()))
        }
        sqlx::Error::PoolTimedOut => FleetError::unavailable("timed out acquiring a connection"),
        sqlx::Error::PoolClosed => FleetError::unavailable("connection pool closed"),
        sqlx::Error::Io(e) => FleetError::unavailable(format!("database io: {e}")),
        other => FleetError::unavailable(format!("database failure: {other}")),
    }
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> FleetResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FleetError::unavailable(format!("corrupt {column} '{value}': {e}")))
}
