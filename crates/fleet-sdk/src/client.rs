//! HTTP client for the fleet monitor server.

use fleet_core::{
    CreateDroneRequest, CreateTaskRequest, CreateUserRequest, Drone, DroneId, ErrorBody,
    ErrorKind, FlightStatus, Task, TaskId, TaskStatus, Telemetry, UpdateDroneRequest,
    UpdateUserRequest, User, UserId,
};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the operation with a typed error.
    #[error("server returned {status}: {message}")]
    Api {
        status: u16,
        kind: ErrorKind,
        message: String,
    },

    #[error("unexpected response {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl ClientError {
    /// Error kind reported by the server, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { kind, .. } => *kind == ErrorKind::Unavailable,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client for the fleet monitor REST API.
#[derive(Debug, Clone)]
pub struct FleetClient {
    base_url: String,
    client: reqwest::Client,
}

impl FleetClient {
    /// Create a new client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the server is up.
    pub async fn health(&self) -> ClientResult<bool> {
        let response = self
            .client
            .get(self.url(&["health"])?)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    // ========== USERS ==========

    pub async fn create_user(&self, name: &str) -> ClientResult<User> {
        let body = CreateUserRequest {
            name: name.to_string(),
        };
        self.send(self.request(Method::POST, &["v1", "users"])?.json(&body))
            .await
    }

    pub async fn list_users(&self) -> ClientResult<Vec<User>> {
        self.send(self.request(Method::GET, &["v1", "users"])?).await
    }

    pub async fn list_user_names(&self) -> ClientResult<Vec<String>> {
        self.send(self.request(Method::GET, &["v1", "users", "names"])?)
            .await
    }

    pub async fn get_user(&self, id: UserId) -> ClientResult<User> {
        self.send(self.request(Method::GET, &["v1", "users", &id.to_string()])?)
            .await
    }

    pub async fn update_user(&self, id: UserId, name: &str) -> ClientResult<User> {
        let body = UpdateUserRequest {
            name: name.to_string(),
        };
        self.send(
            self.request(Method::PUT, &["v1", "users", &id.to_string()])?
                .json(&body),
        )
        .await
    }

    pub async fn delete_user(&self, id: UserId) -> ClientResult<()> {
        self.send_empty(self.request(Method::DELETE, &["v1", "users", &id.to_string()])?)
            .await
    }

    /// Delete the single user carrying `name`.
    ///
    /// An all-digit name is interpreted by the server as a user id.
    pub async fn delete_user_by_name(&self, name: &str) -> ClientResult<()> {
        self.send_empty(self.request(Method::DELETE, &["v1", "users", name])?)
            .await
    }

    pub async fn drones_by_owner_name(&self, name: &str) -> ClientResult<Vec<Drone>> {
        self.send(self.request(Method::GET, &["v1", "users", "by-name", name, "drones"])?)
            .await
    }

    // ========== DRONES ==========

    pub async fn create_drone(
        &self,
        hardware_id: &str,
        owner_id: Option<UserId>,
    ) -> ClientResult<Drone> {
        let body = CreateDroneRequest {
            hardware_id: hardware_id.to_string(),
            owner_id,
        };
        self.send(self.request(Method::POST, &["v1", "drones"])?.json(&body))
            .await
    }

    pub async fn list_drones(&self) -> ClientResult<Vec<Drone>> {
        self.send(self.request(Method::GET, &["v1", "drones"])?).await
    }

    pub async fn drones_by_flight_status(&self, status: FlightStatus) -> ClientResult<Vec<Drone>> {
        self.send(
            self.request(Method::GET, &["v1", "drones"])?
                .query(&[("flight_status", status.to_string())]),
        )
        .await
    }

    pub async fn drones_by_task_status(&self, status: TaskStatus) -> ClientResult<Vec<Drone>> {
        self.send(
            self.request(Method::GET, &["v1", "drones"])?
                .query(&[("task_status", status.to_string())]),
        )
        .await
    }

    pub async fn get_drone(&self, id: DroneId) -> ClientResult<Drone> {
        self.send(self.request(Method::GET, &["v1", "drones", &id.to_string()])?)
            .await
    }

    pub async fn update_drone(
        &self,
        id: DroneId,
        hardware_id: &str,
        owner_id: Option<UserId>,
    ) -> ClientResult<Drone> {
        let body = UpdateDroneRequest {
            hardware_id: hardware_id.to_string(),
            owner_id,
        };
        self.send(
            self.request(Method::PUT, &["v1", "drones", &id.to_string()])?
                .json(&body),
        )
        .await
    }

    pub async fn delete_drone(&self, id: DroneId) -> ClientResult<()> {
        self.send_empty(self.request(Method::DELETE, &["v1", "drones", &id.to_string()])?)
            .await
    }

    /// Push a telemetry sample and return the drone's new state.
    pub async fn send_telemetry(&self, id: DroneId, telemetry: &Telemetry) -> ClientResult<Drone> {
        self.send(
            self.request(Method::PUT, &["v1", "drones", &id.to_string(), "telemetry"])?
                .json(telemetry),
        )
        .await
    }

    // ========== TASKS ==========

    pub async fn create_task(&self, request: &CreateTaskRequest) -> ClientResult<Task> {
        self.send(self.request(Method::POST, &["v1", "tasks"])?.json(request))
            .await
    }

    pub async fn list_tasks(&self) -> ClientResult<Vec<Task>> {
        self.send(self.request(Method::GET, &["v1", "tasks"])?).await
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> ClientResult<Vec<Task>> {
        self.send(
            self.request(Method::GET, &["v1", "tasks"])?
                .query(&[("status", status.to_string())]),
        )
        .await
    }

    pub async fn get_task(&self, id: TaskId) -> ClientResult<Task> {
        self.send(self.request(Method::GET, &["v1", "tasks", &id.to_string()])?)
            .await
    }

    pub async fn assign_task(&self, id: TaskId) -> ClientResult<Task> {
        self.task_action(id, "assign").await
    }

    pub async fn complete_task(&self, id: TaskId) -> ClientResult<Task> {
        self.task_action(id, "complete").await
    }

    pub async fn abort_task(&self, id: TaskId) -> ClientResult<Task> {
        self.task_action(id, "abort").await
    }

    async fn task_action(&self, id: TaskId, action: &str) -> ClientResult<Task> {
        self.send(self.request(Method::POST, &["v1", "tasks", &id.to_string(), action])?)
            .await
    }

    // ========== TRANSPORT ==========

    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> ClientResult<RequestBuilder> {
        Ok(self.client.request(method, self.url(segments)?))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.bytes().await?;
        Err(decode_error(status, &body))
    }

    async fn send_empty(&self, request: RequestBuilder) -> ClientResult<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await?;
        Err(decode_error(status, &body))
    }
}

fn decode_error(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => {
            tracing::debug!("Fleet server rejected request ({}): {}", status, error.message);
            ClientError::Api {
                status: status.as_u16(),
                kind: error.error_kind,
                message: error.message,
            }
        }
        Err(_) => ClientError::Unexpected {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
