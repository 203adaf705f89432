//! Per-session mutual exclusion
//!
//! At most one in-flight message per session. Acquisition is fail-fast: a
//! loser gets CONFLICT immediately rather than queueing. Entries older than
//! the timeout are reclaimed so a crashed holder cannot strand its session.
//! The guard releases on drop, which covers every exit path including
//! panics inside the critical section.

use crate::utils::error::{GatewayError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default lock timeout; a holder older than this is presumed dead
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    held_at: Instant,
    token: u64,
}

/// In-memory session lock map
///
/// Single-node implementation of the lock contract; a multi-node deployment
/// swaps in a database advisory lock behind the same interface.
pub struct SessionLockMap {
    inner: Arc<DashMap<String, LockEntry>>,
    timeout: Duration,
    next_token: AtomicU64,
}

impl SessionLockMap {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            timeout,
            next_token: AtomicU64::new(1),
        }
    }

    /// Try to take the lock for a session; CONFLICT if someone holds it
    pub fn acquire(&self, session_id: &str) -> Result<SessionLockGuard> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let entry = LockEntry {
            held_at: Instant::now(),
            token,
        };

        match self.inner.entry(session_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().held_at.elapsed() > self.timeout {
                    warn!(session_id, "reclaiming stale session lock");
                    slot.insert(entry);
                } else {
                    return Err(GatewayError::conflict(
                        "another message is being processed for this session; retry shortly",
                    ));
                }
            }
        }

        Ok(SessionLockGuard {
            map: Arc::clone(&self.inner),
            session_id: session_id.to_string(),
            token,
        })
    }

    /// Drop entries past the timeout; returns how many were removed
    pub fn sweep(&self) -> usize {
        let before = self.inner.len();
        let timeout = self.timeout;
        self.inner.retain(|_, entry| entry.held_at.elapsed() <= timeout);
        before - self.inner.len()
    }

    /// Number of currently held locks
    pub fn held(&self) -> usize {
        self.inner.len()
    }
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

/// RAII lock handle; releases on drop
#[derive(Debug)]
pub struct SessionLockGuard {
    map: Arc<DashMap<String, LockEntry>>,
    session_id: String,
    token: u64,
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        // Only release our own acquisition; a reclaimed-and-reacquired lock
        // belongs to someone else now
        self.map
            .remove_if(&self.session_id, |_, entry| entry.token == self.token);
    }
}

/// Background task clearing stale entries every `interval`
pub fn spawn_sweeper(
    locks: Arc<SessionLockMap>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = locks.sweep();
            if removed > 0 {
                debug!(removed, "swept stale session locks");
            }
        }
    })
}
