//! # Worker Pool Router
//!
//! The pool owns every [`WorkerHandle`] this node can dispatch to and decides which one
//! serves the next request.
//!
//! ## Concurrency
//!
//! The membership list is the only mutable state shared between dispatches. It lives
//! behind a single lock and is never handed out by reference: [`WorkerPool::select_worker`]
//! picks *and clones* under the lock, so a caller always receives a snapshot that was
//! valid at one consistent point in time. Once [`WorkerPool::deregister`] has returned,
//! no later selection can observe the removed handle.
//!
//! The lock is never held across an `.await`; every operation is a short critical section.

pub mod policy;

pub use policy::{RandomPolicy, RoundRobinPolicy, SelectionPolicy};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Identity of one worker, unique within the pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Reachability of a worker as last reported by the membership layer or the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Alive,
    Unreachable,
}

/// Opaque reference to one addressable worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerHandle {
    pub id: WorkerId,
    /// Where the worker lives, e.g. `akka.tcp://ClusterSys@10.0.0.5:9001/user/console-1`.
    pub address: String,
    pub liveness: Liveness,
}

impl WorkerHandle {
    /// A freshly registered, reachable worker.
    pub fn alive(id: impl Into<WorkerId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            liveness: Liveness::Alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.liveness == Liveness::Alive
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("No workers available")]
    NoWorkersAvailable,
}

/// The set of workers this node routes to, plus the policy that chooses between them.
pub struct WorkerPool {
    handles: Mutex<Vec<WorkerHandle>>,
    policy: Box<dyn SelectionPolicy>,
}

impl WorkerPool {
    /// An empty pool with uniform random selection.
    pub fn new() -> Self {
        Self::with_policy(RandomPolicy::new())
    }

    pub fn with_policy(policy: impl SelectionPolicy + 'static) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            policy: Box::new(policy),
        }
    }

    /// Adds a worker. Registering an id that is already present is a no-op.
    ///
    /// Returns `true` if the handle was added.
    pub fn register(&self, handle: WorkerHandle) -> bool {
        let mut handles = self.handles.lock();
        if handles.iter().any(|existing| existing.id == handle.id) {
            debug!(worker = %handle.id, "Already registered");
            return false;
        }
        info!(worker = %handle.id, address = %handle.address, size = handles.len() + 1, "Registered");
        handles.push(handle);
        true
    }

    /// Removes a worker. Deregistering an unknown id is a no-op.
    ///
    /// Returns `true` if a handle was removed.
    pub fn deregister(&self, id: &WorkerId) -> bool {
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|handle| &handle.id != id);
        let removed = handles.len() != before;
        if removed {
            info!(worker = %id, size = handles.len(), "Deregistered");
        }
        removed
    }

    /// Records a reachability change. Unreachable workers stay registered but are skipped
    /// by selection until they are marked Alive again.
    ///
    /// Returns `true` if the worker is registered.
    pub fn set_liveness(&self, id: &WorkerId, liveness: Liveness) -> bool {
        let mut handles = self.handles.lock();
        match handles.iter_mut().find(|handle| &handle.id == id) {
            Some(handle) => {
                if handle.liveness != liveness {
                    info!(worker = %id, ?liveness, "Liveness changed");
                    handle.liveness = liveness;
                }
                true
            }
            None => false,
        }
    }

    /// Chooses one Alive worker according to the pool's policy.
    pub fn select_worker(&self) -> Result<WorkerHandle, PoolError> {
        let handles = self.handles.lock();
        let alive: Vec<&WorkerHandle> = handles.iter().filter(|h| h.is_alive()).collect();
        if alive.is_empty() {
            debug!(registered = handles.len(), "No alive workers");
            return Err(PoolError::NoWorkersAvailable);
        }
        let index = self.policy.pick(alive.len()).min(alive.len() - 1);
        Ok(alive[index].clone())
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.handles.lock().iter().filter(|h| h.is_alive()).count()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.handles.lock().iter().map(|h| h.id.clone()).collect()
    }

    /// Removes and returns every handle. Used on shutdown.
    pub fn drain(&self) -> Vec<WorkerHandle> {
        let drained = std::mem::take(&mut *self.handles.lock());
        info!(count = drained.len(), "Drained pool");
        drained
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
