//! Server configuration from environment.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// SQLite file, or `:memory:`.
    pub database_path: String,
    pub database_max_connections: u32,
    /// Bounds pool acquisition and SQLite's busy wait.
    pub database_timeout: Duration,
    /// Upper bound for a whole service operation.
    pub operation_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            database_path: "data/fleet.db".to_string(),
            database_max_connections: 5,
            database_timeout: Duration::from_millis(5_000),
            operation_timeout: Duration::from_millis(10_000),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::var("FLEET_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.server_port),
            database_path: env::var("FLEET_DATABASE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.database_path),
            database_max_connections: env::var("FLEET_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            database_timeout: env::var("FLEET_DB_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.database_timeout),
            operation_timeout: env::var("FLEET_OP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
            log_format: match env::var("FLEET_LOG_FORMAT") {
                Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    /// In-memory configuration for tests and demos.
    pub fn in_memory() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            database_max_connections: 1,
            ..Self::default()
        }
    }
}
