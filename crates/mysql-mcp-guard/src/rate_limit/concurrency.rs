//! Per-client concurrent query limit

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of queries one client may have executing at once.
///
/// A permit is held from admission until the request finishes and released
/// on drop. Acquisition never waits: a client at its limit is refused.
pub struct ConcurrencyLimiter {
    max: u32,
    clients: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("max", &self.max)
            .field("clients", &self.clients.read().len())
            .finish()
    }
}

impl ConcurrencyLimiter {
    /// `max` is raised to at least one
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            max: max.max(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Take a slot for `client_key`, `None` when all its slots are in use
    pub fn try_acquire(&self, client_key: &str) -> Option<OwnedSemaphorePermit> {
        let permit = self.semaphore(client_key).try_acquire_owned().ok();
        if permit.is_none() {
            tracing::debug!(
                client_id = client_key,
                max_concurrent = self.max,
                "Concurrent query limit reached"
            );
        }
        permit
    }

    /// Queries currently executing for `client_key`
    #[must_use]
    pub fn in_flight(&self, client_key: &str) -> usize {
        self.clients
            .read()
            .get(client_key)
            .map_or(0, |s| self.max as usize - s.available_permits())
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        if let Some(existing) = self.clients.read().get(key) {
            return Arc::clone(existing);
        }

        let mut clients = self.clients.write();
        Arc::clone(
            clients
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max as usize))),
        )
    }

    /// Drop clients with no query in flight. Returns the number removed.
    pub fn prune_idle(&self) -> usize {
        let max = self.max as usize;
        let mut clients = self.clients.write();
        let before = clients.len();

        // outstanding permits hold a strong reference to their semaphore
        clients.retain(|_, semaphore| {
            Arc::strong_count(semaphore) > 1 || semaphore.available_permits() < max
        });

        before - clients.len()
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.read().len()
    }
}
