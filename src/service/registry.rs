//! # Session Registry
//!
//! Tracks every open session on the server, keyed by client identity.
//!
//! ## Features
//! - **Thread-safe**: Uses Arc<Mutex<>> so sessions can register and
//!   deregister concurrently without losing entries
//! - **Snapshots**: [`SessionRegistry::list_active`] copies the current entries,
//!   so callers never see a session appear or vanish mid-iteration
//! - **Shutdown**: [`SessionRegistry::close_all`] asks every session to close
//!
//! ## Usage
//! ```ignore
//! let registry = SessionRegistry::new();
//! registry.add(session.handle()).await;
//!
//! for info in registry.list_active().await {
//!     println!("{} is {}", info.identity, info.state);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::identity::ClientIdentity;
use crate::service::session::SessionState;

/// The registry's view of one session.
///
/// The session itself keeps exclusive ownership of its socket; the handle
/// only observes state and can request a close.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    identity: ClientIdentity,
    state: watch::Receiver<SessionState>,
    close: CancellationToken,
    connected_at: Instant,
}

impl SessionHandle {
    pub(crate) fn new(
        identity: ClientIdentity,
        state: watch::Receiver<SessionState>,
        close: CancellationToken,
        connected_at: Instant,
    ) -> Self {
        Self {
            identity,
            state,
            close,
            connected_at,
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Ask the session to close at its next read.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Wait until the session reaches `target`.
    ///
    /// Returns `false` if the session ended without ever reaching it.
    pub async fn wait_for(&self, target: SessionState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| *s == target).await.is_ok();
        reached
    }
}

/// Point-in-time copy of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub identity: ClientIdentity,
    pub state: SessionState,
    pub connected_at: Instant,
}

/// Thread-safe set of open sessions
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    /// Client identity -> session handle
    sessions: HashMap<ClientIdentity, SessionHandle>,
    /// Sessions ever registered
    total_added: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// Returns `false`, leaving the existing entry in place, if the identity
    /// is already registered.
    pub async fn add(&self, handle: SessionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        let identity = handle.identity();

        if inner.sessions.contains_key(&identity) {
            warn!(client = %identity, "Session already registered");
            return false;
        }

        inner.sessions.insert(identity, handle);
        inner.total_added += 1;
        trace!(
            client = %identity,
            session_count = inner.sessions.len(),
            "Session registered"
        );
        true
    }

    /// Deregister a session, returning its handle if it was present.
    pub async fn remove(&self, identity: &ClientIdentity) -> Option<SessionHandle> {
        let mut inner = self.inner.lock().await;
        let removed = inner.sessions.remove(identity);
        if removed.is_some() {
            trace!(
                client = %identity,
                session_count = inner.sessions.len(),
                "Session deregistered"
            );
        }
        removed
    }

    pub async fn get(&self, identity: &ClientIdentity) -> Option<SessionHandle> {
        self.inner.lock().await.sessions.get(identity).cloned()
    }

    /// Snapshot of all registered sessions, oldest first.
    pub async fn list_active(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock().await;
        let mut infos: Vec<SessionInfo> = inner
            .sessions
            .values()
            .map(|h| SessionInfo {
                identity: h.identity(),
                state: h.state(),
                connected_at: h.connected_at(),
            })
            .collect();
        infos.sort_by_key(|i| (i.connected_at, i.identity));
        infos
    }

    /// Snapshot of all registered handles.
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.inner.lock().await.sessions.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.sessions.is_empty()
    }

    /// Ask every registered session to close. Returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let inner = self.inner.lock().await;
        for handle in inner.sessions.values() {
            handle.close();
        }
        debug!(count = inner.sessions.len(), "Close requested for all sessions");
        inner.sessions.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock().await;
        RegistryStats {
            active: inner.sessions.len(),
            total_added: inner.total_added,
        }
    }
}

/// Statistics about the registry
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    /// Currently registered sessions
    pub active: usize,
    /// Sessions ever registered
    pub total_added: u64,
}
