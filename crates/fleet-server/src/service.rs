//! Fleet service: the single entry point for every fleet operation.
//!
//! Each mutating operation locks the entities it touches, re-reads them in
//! one SQLite transaction, plans the change with [`fleet_core::lifecycle`]
//! and writes every mutated row before committing. A failed plan or write
//! drops the transaction, which rolls it back.

use chrono::Utc;
use fleet_core::{
    normalize_hardware_id, normalize_name, plan_assignment, plan_finish, plan_telemetry,
    CreateTaskRequest, Drone, DroneId, EntityKind, FleetError, FleetResult, FlightStatus,
    StatusMachine, Task, TaskId, TaskStatus, Telemetry, User, UserId, UserRef,
};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::locks::{EntityGuards, EntityKey, LockRegistry};
use crate::persistence::{self, db_error, drones, tasks, users, Database};

const RETRY_BASE: Duration = Duration::from_millis(5);
const RETRY_MAX: Duration = Duration::from_millis(200);
const MAX_IDLE_LOCKS: usize = 1024;

pub struct FleetService {
    db: Database,
    locks: LockRegistry,
    op_timeout: Duration,
}

impl FleetService {
    pub fn new(db: Database, op_timeout: Duration) -> Self {
        Self {
            db,
            locks: LockRegistry::new(MAX_IDLE_LOCKS),
            op_timeout,
        }
    }

    /// Open the configured database and build a service on top of it.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let db = persistence::init_database(
            &config.database_path,
            config.database_max_connections,
            config.database_timeout,
        )
        .await?;
        Ok(Self::new(db, config.operation_timeout))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ========== USERS ==========

    pub async fn create_user(&self, name: &str) -> FleetResult<User> {
        let name = normalize_name(name)?;
        let user = self
            .run("create_user", || async {
                let mut conn = self.conn().await?;
                users::insert_user(&mut conn, &name, Utc::now()).await
            })
            .await?;
        tracing::info!("Created user {} ({})", user.id, user.name);
        Ok(user)
    }

    pub async fn update_user(&self, id: UserId, name: &str) -> FleetResult<User> {
        let name = normalize_name(name)?;
        let user = self
            .run("update_user", || async {
                let _guards = self.locks.lock(EntityKey::User(id)).await;
                let mut tx = self.begin().await?;
                if !users::rename_user(&mut tx, id, &name, Utc::now()).await? {
                    return Err(FleetError::not_found(EntityKind::User, id));
                }
                let user = require_user(&mut tx, id).await?;
                commit(tx).await?;
                Ok(user)
            })
            .await?;
        tracing::info!("Renamed user {} to {}", user.id, user.name);
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> FleetResult<User> {
        self.run("get_user", || async {
            let mut conn = self.conn().await?;
            require_user(&mut conn, id).await
        })
        .await
    }

    pub async fn list_users(&self) -> FleetResult<Vec<User>> {
        self.run("list_users", || async {
            let mut conn = self.conn().await?;
            users::list_users(&mut conn).await
        })
        .await
    }

    pub async fn list_user_names(&self) -> FleetResult<Vec<String>> {
        self.run("list_user_names", || async {
            let mut conn = self.conn().await?;
            users::list_user_names(&mut conn).await
        })
        .await
    }

    /// Delete a user. Their drones stay registered without an owner.
    ///
    /// A name that matches more than one user is reported as not found.
    pub async fn delete_user(&self, user: &UserRef) -> FleetResult<User> {
        let (deleted, released) = self
            .run("delete_user", || async {
                let id = self.resolve_user(user).await?;
                let _guards = self.locks.lock(EntityKey::User(id)).await;
                let mut tx = self.begin().await?;
                let existing = require_user(&mut tx, id).await?;
                let released = drones::clear_owner(&mut tx, id).await?;
                if !users::delete_user(&mut tx, id).await? {
                    return Err(FleetError::not_found(EntityKind::User, id));
                }
                commit(tx).await?;
                Ok((existing, released))
            })
            .await?;
        tracing::info!(
            "Deleted user {} ({}), released {} drone(s)",
            deleted.id,
            deleted.name,
            released
        );
        Ok(deleted)
    }

    // ========== DRONES ==========

    pub async fn create_drone(
        &self,
        hardware_id: &str,
        owner_id: Option<UserId>,
    ) -> FleetResult<Drone> {
        let hardware_id = normalize_hardware_id(hardware_id)?;
        let drone = self
            .run("create_drone", || async {
                let _guards = self.locks.lock_all(owner_id.map(EntityKey::User)).await;
                let mut tx = self.begin().await?;
                if let Some(owner) = owner_id {
                    require_user(&mut tx, owner).await?;
                }
                if drones::hardware_id_in_use(&mut tx, &hardware_id, None).await? {
                    return Err(duplicate_hardware_id(&hardware_id));
                }
                let drone = drones::insert_drone(&mut tx, &hardware_id, owner_id, Utc::now()).await?;
                commit(tx).await?;
                Ok(drone)
            })
            .await?;
        tracing::info!("Registered drone {} ({})", drone.id, drone.hardware_id);
        Ok(drone)
    }

    /// Re-bind a drone's hardware id and owner.
    pub async fn update_drone(
        &self,
        id: DroneId,
        hardware_id: &str,
        owner_id: Option<UserId>,
    ) -> FleetResult<Drone> {
        let hardware_id = normalize_hardware_id(hardware_id)?;
        let drone = self
            .run("update_drone", || async {
                let keys = owner_id
                    .map(EntityKey::User)
                    .into_iter()
                    .chain([EntityKey::Drone(id)]);
                let _guards = self.locks.lock_all(keys).await;
                let mut tx = self.begin().await?;
                require_drone(&mut tx, id).await?;
                if let Some(owner) = owner_id {
                    require_user(&mut tx, owner).await?;
                }
                if drones::hardware_id_in_use(&mut tx, &hardware_id, Some(id)).await? {
                    return Err(duplicate_hardware_id(&hardware_id));
                }
                drones::rebind_drone(&mut tx, id, &hardware_id, owner_id).await?;
                let drone = require_drone(&mut tx, id).await?;
                commit(tx).await?;
                Ok(drone)
            })
            .await?;
        tracing::info!(
            "Updated drone {} (hardware {}, owner {:?})",
            drone.id,
            drone.hardware_id,
            drone.owner_id
        );
        Ok(drone)
    }

    pub async fn get_drone(&self, id: DroneId) -> FleetResult<Drone> {
        self.run("get_drone", || async {
            let mut conn = self.conn().await?;
            require_drone(&mut conn, id).await
        })
        .await
    }

    pub async fn list_drones(&self) -> FleetResult<Vec<Drone>> {
        self.run("list_drones", || async {
            let mut conn = self.conn().await?;
            drones::list_drones(&mut conn).await
        })
        .await
    }

    /// Delete a drone. Refused while it is executing a task.
    pub async fn delete_drone(&self, id: DroneId) -> FleetResult<Drone> {
        let drone = self
            .run("delete_drone", || async {
                let _guards = self.locks.lock(EntityKey::Drone(id)).await;
                let mut tx = self.begin().await?;
                let drone = require_drone(&mut tx, id).await?;
                if let Some(task_id) = drone.current_task_id {
                    let task = tasks::fetch_task(&mut tx, task_id).await?;
                    if let Some(task) = task.filter(|t| !t.status.is_terminal()) {
                        return Err(FleetError::conflict(format!(
                            "drone {} is executing task {} ({})",
                            id, task.id, task.status
                        )));
                    }
                }
                if !drones::delete_drone(&mut tx, id).await? {
                    return Err(FleetError::not_found(EntityKind::Drone, id));
                }
                commit(tx).await?;
                Ok(drone)
            })
            .await?;
        tracing::info!("Deleted drone {} ({})", drone.id, drone.hardware_id);
        Ok(drone)
    }

    /// Ingest one telemetry sample.
    ///
    /// Leaving flight while a task is ongoing ends that task in the same
    /// transaction.
    pub async fn update_telemetry(
        &self,
        drone_id: DroneId,
        telemetry: &Telemetry,
    ) -> FleetResult<Drone> {
        telemetry.validate()?;
        let (drone, finished) = self
            .run("update_telemetry", || async {
                let _drone_guard = self.locks.lock(EntityKey::Drone(drone_id)).await;
                let mut tx = self.begin().await?;
                let drone = require_drone(&mut tx, drone_id).await?;

                // Drone before task keeps the registry's lock order.
                let _task_guard = match drone.current_task_id {
                    Some(task_id) => Some(self.locks.lock(EntityKey::Task(task_id)).await),
                    None => None,
                };
                let current = match drone.current_task_id {
                    Some(task_id) => tasks::fetch_task(&mut tx, task_id).await?,
                    None => None,
                };

                let outcome = plan_telemetry(&drone, current.as_ref(), telemetry, Utc::now())?;
                if let (Some(finished), Some(previous)) = (&outcome.finished_task, &current) {
                    tasks::save_task_status(&mut tx, finished, previous.status).await?;
                }
                drones::save_drone_state(&mut tx, &outcome.drone, &drone).await?;
                commit(tx).await?;
                Ok((outcome.drone, outcome.finished_task))
            })
            .await?;

        match finished {
            Some(task) => tracing::info!(
                "Drone {} reported {}, task {} is now {}",
                drone.id,
                drone.flight_status,
                task.id,
                task.status
            ),
            None => tracing::debug!(
                "Telemetry for drone {}: {} at ({}, {}) alt {}m battery {}%",
                drone.id,
                drone.flight_status,
                drone.gps.lat,
                drone.gps.lon,
                drone.altitude_m,
                drone.battery
            ),
        }
        Ok(drone)
    }

    // ========== TASKS ==========

    pub async fn create_task(&self, request: &CreateTaskRequest) -> FleetResult<Task> {
        request.validate()?;
        let task = self
            .run("create_task", || async {
                let keys = [
                    EntityKey::User(request.user_id),
                    EntityKey::Drone(request.drone_id),
                ];
                let _guards = self.locks.lock_all(keys).await;
                let mut tx = self.begin().await?;
                require_user(&mut tx, request.user_id).await?;
                require_drone(&mut tx, request.drone_id).await?;
                let task = tasks::insert_task(&mut tx, request, Utc::now()).await?;
                commit(tx).await?;
                Ok(task)
            })
            .await?;
        tracing::info!(
            "Created task {} for drone {} (user {})",
            task.id,
            task.drone_id,
            task.user_id
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: TaskId) -> FleetResult<Task> {
        self.run("get_task", || async {
            let mut conn = self.conn().await?;
            require_task(&mut conn, id).await
        })
        .await
    }

    pub async fn list_tasks(&self) -> FleetResult<Vec<Task>> {
        self.run("list_tasks", || async {
            let mut conn = self.conn().await?;
            tasks::list_tasks(&mut conn).await
        })
        .await
    }

    /// Start a waiting task on its drone.
    pub async fn assign_task(&self, task_id: TaskId) -> FleetResult<Task> {
        let task = self
            .run("assign_task", || async {
                let _guards = self.lock_task_and_drone(task_id).await?;
                let mut tx = self.begin().await?;
                let task = require_task(&mut tx, task_id).await?;
                let drone = require_drone(&mut tx, task.drone_id).await?;
                let current = match drone.current_task_id {
                    Some(current_id) if current_id != task.id => {
                        tasks::fetch_task(&mut tx, current_id).await?
                    }
                    _ => None,
                };

                let planned = plan_assignment(&task, &drone, current.as_ref(), Utc::now())?;
                tasks::save_task_status(&mut tx, &planned.task, task.status).await?;
                drones::save_drone_state(&mut tx, &planned.drone, &drone).await?;
                commit(tx).await?;
                Ok(planned.task)
            })
            .await?;
        tracing::info!("Assigned task {} to drone {}", task.id, task.drone_id);
        Ok(task)
    }

    pub async fn complete_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.finish_task("complete_task", task_id, TaskStatus::Completed)
            .await
    }

    pub async fn abort_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.finish_task("abort_task", task_id, TaskStatus::Aborted)
            .await
    }

    async fn finish_task(
        &self,
        op: &'static str,
        task_id: TaskId,
        outcome: TaskStatus,
    ) -> FleetResult<Task> {
        let (task, released) = self
            .run(op, || async {
                let _guards = self.lock_task_and_drone(task_id).await?;
                let mut tx = self.begin().await?;
                let task = require_task(&mut tx, task_id).await?;
                let drone = drones::fetch_drone(&mut tx, task.drone_id).await?;

                let finish = plan_finish(&task, drone.as_ref(), outcome, Utc::now())?;
                tasks::save_task_status(&mut tx, &finish.task, task.status).await?;
                if let (Some(next), Some(previous)) = (&finish.drone, &drone) {
                    drones::save_drone_state(&mut tx, next, previous).await?;
                }
                commit(tx).await?;
                Ok((finish.task, finish.drone))
            })
            .await?;
        match released {
            Some(drone) => tracing::info!(
                "Task {} {}, drone {} released as {}",
                task.id,
                task.status,
                drone.id,
                drone.flight_status
            ),
            None => tracing::info!("Task {} {}", task.id, task.status),
        }
        Ok(task)
    }

    // ========== QUERIES ==========

    pub async fn drones_by_flight_status(&self, status: FlightStatus) -> FleetResult<Vec<Drone>> {
        self.run("drones_by_flight_status", || async {
            let mut conn = self.conn().await?;
            drones::drones_by_flight_status(&mut conn, status).await
        })
        .await
    }

    /// Drones that have at least one task in `status`.
    pub async fn drones_by_task_status(&self, status: TaskStatus) -> FleetResult<Vec<Drone>> {
        self.run("drones_by_task_status", || async {
            let mut conn = self.conn().await?;
            drones::drones_by_task_status(&mut conn, status).await
        })
        .await
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> FleetResult<Vec<Task>> {
        self.run("tasks_by_status", || async {
            let mut conn = self.conn().await?;
            tasks::tasks_by_status(&mut conn, status).await
        })
        .await
    }

    pub async fn drones_by_owner_name(&self, name: &str) -> FleetResult<Vec<Drone>> {
        let name = normalize_name(name)?;
        self.run("drones_by_owner_name", || async {
            let mut conn = self.conn().await?;
            drones::drones_by_owner_name(&mut conn, &name).await
        })
        .await
    }

    // ========== INTERNALS ==========

    /// Run one operation under the operation timeout, retrying attempts
    /// that failed with a transient store error.
    async fn run<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> FleetResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FleetResult<T>>,
    {
        let deadline = Instant::now() + self.op_timeout;
        let mut backoff = Backoff::new(RETRY_BASE, RETRY_MAX);

        let result = loop {
            let outcome = match tokio::time::timeout_at(deadline, attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FleetError::unavailable(format!(
                    "{} timed out after {:?}",
                    op, self.op_timeout
                ))),
            };
            match outcome {
                Err(err) if err.is_retryable() && Instant::now() < deadline => {
                    let delay = backoff.fail();
                    if Instant::now() + delay >= deadline {
                        break Err(err);
                    }
                    tracing::debug!(
                        "{} attempt {} failed, retrying in {:?}: {}",
                        op,
                        backoff.attempts(),
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                other => break other,
            }
        };

        self.locks.prune_idle();
        if let Err(err) = &result {
            match err {
                FleetError::InvalidTransition(_) | FleetError::Conflict(_) => {
                    tracing::warn!("{} rejected: {}", op, err)
                }
                FleetError::Unavailable(_) => tracing::warn!("{} failed: {}", op, err),
                FleetError::Validation(_) | FleetError::NotFound { .. } => {
                    tracing::debug!("{} refused: {}", op, err)
                }
            }
        }
        result
    }

    async fn conn(&self) -> FleetResult<PoolConnection<Sqlite>> {
        self.db.pool().acquire().await.map_err(db_error)
    }

    async fn begin(&self) -> FleetResult<Transaction<'static, Sqlite>> {
        self.db.pool().begin().await.map_err(db_error)
    }

    /// Lock a task and its drone, drone first.
    async fn lock_task_and_drone(&self, task_id: TaskId) -> FleetResult<EntityGuards> {
        // A task's drone id never changes, so it can be read before locking.
        let drone_id = {
            let mut conn = self.conn().await?;
            require_task(&mut conn, task_id).await?.drone_id
        };
        Ok(self
            .locks
            .lock_all([EntityKey::Drone(drone_id), EntityKey::Task(task_id)])
            .await)
    }

    async fn resolve_user(&self, user: &UserRef) -> FleetResult<UserId> {
        match user {
            UserRef::ById(id) => Ok(*id),
            UserRef::ByName(name) => {
                let mut conn = self.conn().await?;
                let matches = users::find_users_by_name(&mut conn, name.trim()).await?;
                match matches.as_slice() {
                    [only] => Ok(only.id),
                    [] => Err(FleetError::not_found(EntityKind::User, user)),
                    many => Err(FleetError::not_found(
                        EntityKind::User,
                        format!("{} (ambiguous: {} users share it)", user, many.len()),
                    )),
                }
            }
        }
    }
}

async fn commit(tx: Transaction<'static, Sqlite>) -> FleetResult<()> {
    tx.commit().await.map_err(db_error)
}

async fn require_user(conn: &mut SqliteConnection, id: UserId) -> FleetResult<User> {
    users::fetch_user(conn, id)
        .await?
        .ok_or_else(|| FleetError::not_found(EntityKind::User, id))
}

async fn require_drone(conn: &mut SqliteConnection, id: DroneId) -> FleetResult<Drone> {
    drones::fetch_drone(conn, id)
        .await?
        .ok_or_else(|| FleetError::not_found(EntityKind::Drone, id))
}

async fn require_task(conn: &mut SqliteConnection, id: TaskId) -> FleetResult<Task> {
    tasks::fetch_task(conn, id)
        .await?
        .ok_or_else(|| FleetError::not_found(EntityKind::Task, id))
}

fn duplicate_hardware_id(hardware_id: &str) -> FleetError {
    FleetError::conflict(format!("hardware id {hardware_id} is already registered"))
}
