//! Per-entity lock registry.
//!
//! Operations lock every entity they mutate before reading it. Keys are
//! always acquired in `EntityKey` order (users, then drones, then tasks), so
//! two operations touching the same drone and task can never deadlock.

use dashmap::DashMap;
use fleet_core::{DroneId, TaskId, UserId};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// An entity that can be locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    User(UserId),
    Drone(DroneId),
    Task(TaskId),
}

/// Guards held for the duration of one operation.
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct EntityGuards {
    keys: Vec<EntityKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl EntityGuards {
    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }
}

#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<EntityKey, Arc<Mutex<()>>>,
    max_idle: usize,
}

impl LockRegistry {
    /// `max_idle` is the number of entries kept before idle ones are pruned.
    pub fn new(max_idle: usize) -> Self {
        Self {
            locks: DashMap::new(),
            max_idle,
        }
    }

    /// Lock every key in canonical order. Duplicates are locked once.
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = EntityKey>) -> EntityGuards {
        let mut keys: Vec<EntityKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            // Clone out of the map before awaiting so no shard lock is held.
            let lock = self.locks.entry(*key).or_default().clone();
            guards.push(lock.lock_owned().await);
        }

        EntityGuards {
            keys,
            _guards: guards,
        }
    }

    pub async fn lock(&self, key: EntityKey) -> EntityGuards {
        self.lock_all([key]).await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop entries nobody holds or waits on once the registry grows past
    /// its idle budget.
    pub fn prune_idle(&self) {
        if self.locks.len() <= self.max_idle {
            return;
        }
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
