//! # Cleanup Registry
//!
//! Ordered collection of pending cleanup actions. Each test scope registers
//! its teardown before a test and removes it afterwards; if the suite aborts,
//! the abort path runs everything that is still registered.
//!
//! Scopes only ever touch their own entry through the opaque handle they got
//! back from [`CleanupRegistry::register`].

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// A deferred cleanup, run at most once
pub type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Opaque reference to a registered action
#[derive(Debug, PartialEq, Eq)]
pub struct CleanupHandle(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    actions: BTreeMap<u64, CleanupAction>,
}

/// Handle-based cleanup registry. Cloning shares the same entries.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

static PROCESS_REGISTRY: LazyLock<CleanupRegistry> = LazyLock::new(CleanupRegistry::new);

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every scope in this process, used by the abort path
    pub fn process() -> Self {
        PROCESS_REGISTRY.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panicking test must not prevent the remaining cleanups from running
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an action and return the handle needed to remove it
    pub fn register<F>(&self, action: F) -> CleanupHandle
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.actions.insert(id, Box::new(action));
        debug!(handle = id, "registered cleanup action");
        CleanupHandle(id)
    }

    /// Remove a previously registered action.
    ///
    /// Returns `false` when the action already ran or was removed.
    pub fn remove(&self, handle: &CleanupHandle) -> bool {
        let removed = self.lock().actions.remove(&handle.0).is_some();
        debug!(handle = handle.0, removed, "removed cleanup action");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every pending action in registration order.
    ///
    /// Actions are drained before any of them runs, so an action that removes
    /// its own handle (a scope teardown does) sees an empty slot instead of
    /// deadlocking.
    pub async fn run_all(&self) {
        let actions = std::mem::take(&mut self.lock().actions);
        if actions.is_empty() {
            return;
        }

        info!("Running {} pending cleanup actions", actions.len());
        for (_, action) in actions {
            action().await;
        }
    }
}
