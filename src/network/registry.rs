//! Connection Registry
//!
//! Maps each live connection to its reveal state and outbound queue.
//!
//! Locking is two-level: the map lock is held only to insert, remove or
//! snapshot entries, and each entry has its own lock for its
//! [`SessionState`]. One player's reveal never waits on another's.
//!
//! Sends are non-blocking pushes into a bounded per-connection queue that a
//! writer task drains to the socket, so broadcasting never performs network
//! I/O while a caller holds the session or overlay locks.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::reveal::SessionState;
use crate::network::protocol::ServerMessage;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No such connection.
    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// Outbound queue is full.
    #[error("Outbound queue full for {0}")]
    QueueFull(ConnectionId),

    /// Writer side is gone.
    #[error("Connection {0} is closed")]
    Closed(ConnectionId),
}

/// One registered connection.
struct SessionEntry {
    outbound: mpsc::Sender<ServerMessage>,
    state: Mutex<SessionState>,
}

impl SessionEntry {
    fn send(&self, id: ConnectionId, message: ServerMessage) -> Result<(), RegistryError> {
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RegistryError::QueueFull(id),
            mpsc::error::TrySendError::Closed(_) => RegistryError::Closed(id),
        })
    }
}

/// Concurrency-safe connection registry.
pub struct SessionRegistry {
    entries: RwLock<BTreeMap<ConnectionId, Arc<SessionEntry>>>,
    buffer: usize,
}

impl SessionRegistry {
    /// Create a registry whose outbound queues hold `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection with a fresh state and return its outbound queue.
    ///
    /// Re-registering an id replaces its state and cancels its pending timeout.
    pub fn register(&self, id: ConnectionId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let entry = Arc::new(SessionEntry {
            outbound: tx,
            state: Mutex::new(SessionState::new()),
        });

        let previous = self.entries.write().insert(id, entry);
        if let Some(previous) = previous {
            debug!("Connection {} re-registered", id);
            previous.state.lock().reset();
        }
        rx
    }

    /// Cancel the connection's pending timeout and remove it.
    ///
    /// Returns false if it was not registered.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        // Map lock is released before taking the entry lock
        let removed = self.entries.write().remove(id);
        match removed {
            Some(entry) => {
                entry.state.lock().reset();
                true
            }
            None => false,
        }
    }

    /// Run `f` with exclusive access to one connection's state.
    pub fn with_session<R>(&self, id: &ConnectionId, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let entry = self.entries.read().get(id).cloned()?;
        let mut state = entry.state.lock();
        Some(f(&mut state))
    }

    /// Queue a message for one connection.
    pub fn send(&self, id: &ConnectionId, message: ServerMessage) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .read()
            .get(id)
            .cloned()
            .ok_or(RegistryError::UnknownConnection(*id))?;
        entry.send(*id, message)
    }

    /// Queue a message for every connection.
    ///
    /// A failed send never stops the fan-out. Returns the ids whose send
    /// failed; callers remove them with [`SessionRegistry::prune`] once they
    /// hold no other locks.
    ///
    /// Must never block: callers hold the session and overlay locks here.
    pub fn broadcast(&self, message: &ServerMessage) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        self.for_each_connection(|id, entry| {
            if let Err(e) = entry.send(id, message.clone()) {
                warn!("Broadcast to {} failed: {}", id, e);
                failed.push(id);
            }
        });
        failed
    }

    /// Remove connections whose sends failed.
    pub fn prune(&self, ids: impl IntoIterator<Item = ConnectionId>) {
        for id in ids {
            if self.unregister(&id) {
                debug!("Removed unreachable connection {}", id);
            }
        }
    }

    /// Visit a snapshot of the registered connections.
    fn for_each_connection(&self, mut f: impl FnMut(ConnectionId, &SessionEntry)) {
        let snapshot: Vec<(ConnectionId, Arc<SessionEntry>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();
        for (id, entry) in snapshot {
            f(id, &entry);
        }
    }

    /// Whether a connection is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Registered connection count.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Position;

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = SessionRegistry::new(8);
        let id = Uuid::new_v4();
        let _rx = registry.register(id);

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = SessionRegistry::new(8);
        let mut receivers: Vec<_> = (0..3).map(|_| registry.register(Uuid::new_v4())).collect();

        let failed = registry.broadcast(&ServerMessage::hover(Position::new(1, 1)));
        assert!(failed.is_empty());
        for rx in &mut receivers {
            assert_eq!(drain(rx), vec![ServerMessage::hover(Position::new(1, 1))]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_dead_connection() {
        let registry = SessionRegistry::new(8);
        let dead = Uuid::new_v4();
        drop(registry.register(dead));
        let alive = Uuid::new_v4();
        let mut rx = registry.register(alive);

        let failed = registry.broadcast(&ServerMessage::leave(Position::new(0, 3)));
        assert_eq!(failed, vec![dead]);
        assert_eq!(drain(&mut rx).len(), 1);

        registry.prune(failed);
        assert!(!registry.contains(&dead));
        assert!(registry.contains(&alive));
    }

    #[tokio::test]
    async fn test_full_queue_counts_as_failure() {
        let registry = SessionRegistry::new(1);
        let id = Uuid::new_v4();
        let _rx = registry.register(id);

        assert!(registry.broadcast(&ServerMessage::hover(Position::new(0, 0))).is_empty());
        assert_eq!(registry.broadcast(&ServerMessage::hover(Position::new(0, 0))), vec![id]);
        assert_eq!(
            registry.send(&id, ServerMessage::hover(Position::new(0, 0))),
            Err(RegistryError::QueueFull(id))
        );
    }

    #[tokio::test]
    async fn test_send_unknown_connection() {
        let registry = SessionRegistry::new(4);
        let id = Uuid::new_v4();
        assert_eq!(
            registry.send(&id, ServerMessage::hover(Position::new(0, 0))),
            Err(RegistryError::UnknownConnection(id))
        );
    }

    #[tokio::test]
    async fn test_with_session_is_per_entry() {
        let registry = SessionRegistry::new(4);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let _ra = registry.register(a);
        let _rb = registry.register(b);

        registry.with_session(&a, |state| state.set_name("alice".into()));
        // Holding a's lock does not block access to b
        registry.with_session(&a, |_| {
            assert_eq!(registry.with_session(&b, |state| state.name().map(String::from)), Some(None));
        });
        assert_eq!(
            registry.with_session(&a, |state| state.name().map(String::from)),
            Some(Some("alice".to_string()))
        );
        assert!(registry.with_session(&Uuid::new_v4(), |_| ()).is_none());
    }

    #[tokio::test]
    async fn test_reregister_replaces_state() {
        let registry = SessionRegistry::new(4);
        let id = Uuid::new_v4();
        let _old = registry.register(id);
        registry.with_session(&id, |state| state.set_name("old".into()));

        let _new = registry.register(id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.with_session(&id, |state| state.name().is_none()), Some(true));
    }
}
