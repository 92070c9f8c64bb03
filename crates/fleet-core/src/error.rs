//! Error kinds shared by the fleet service and its adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Entity families tracked by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Drone,
    Task,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Drone => "drone",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected status change.
///
/// Produced by the state machines in [`crate::status`] and by the
/// cross-entity guards in [`crate::lifecycle`]. Never accompanied by a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} status transition from {from} to {to}{}", detail_suffix(.detail))]
pub struct TransitionError {
    pub entity: EntityKind,
    pub from: &'static str,
    pub to: &'static str,
    pub detail: Option<&'static str>,
}

impl TransitionError {
    pub fn new(entity: EntityKind, from: &'static str, to: &'static str) -> Self {
        Self {
            entity,
            from,
            to,
            detail: None,
        }
    }

    /// Attach a short reason for guard failures.
    pub fn with_detail(mut self, detail: &'static str) -> Self {
        self.detail = Some(detail);
        self
    }
}

fn detail_suffix(detail: &Option<&'static str>) -> String {
    detail.map(|d| format!(": {d}")).unwrap_or_default()
}

/// Machine-readable error category, stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
    Conflict,
    Unavailable,
}

/// Failure of a single fleet operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    /// Malformed or missing input. Not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist. Not retried.
    #[error("{entity} not found: {key}")]
    NotFound { entity: EntityKind, key: String },

    /// The requested state change is illegal from the current state.
    /// Callers should re-fetch before trying again.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The operation would break a uniqueness or single-active-task rule.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient persistence failure; safe to retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl FleetError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: EntityKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Wire form of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_kind: ErrorKind,
    pub message: String,
}

impl From<&FleetError> for ErrorBody {
    fn from(err: &FleetError) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;
