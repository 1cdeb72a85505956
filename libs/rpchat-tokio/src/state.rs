use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use rpchat_core::SessionId;

/// Session ID generation counter
#[derive(Debug)]
pub struct SessionIdGenerator(AtomicU64);

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Generate a unique, monotonically increasing session ID
    pub fn generate(&self) -> SessionId {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight session metadata
#[derive(Debug)]
pub struct ConnectionHandle {
    pub session_id: SessionId,
    pub peer_addr: String,
}

/// Server state tracking connections and notifications
pub struct ServerState {
    pub connections: DashMap<SessionId, ConnectionHandle>,
    session_id_gen: SessionIdGenerator,
    notification_senders: DashMap<SessionId, tokio::sync::mpsc::Sender<()>>,
    started: Instant,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            session_id_gen: SessionIdGenerator::new(),
            notification_senders: DashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn register_notification(
        &self,
        session_id: SessionId,
        sender: tokio::sync::mpsc::Sender<()>,
    ) {
        self.notification_senders.insert(session_id, sender);
    }

    pub fn remove_notification(&self, session_id: SessionId) {
        self.notification_senders.remove(&session_id);
    }

    /// Wake a session's handler because frames were queued for it.
    ///
    /// Uses `try_send`: a full channel already holds a pending wakeup, and
    /// the handler drains everything it is allowed to send on each wake.
    pub fn notify_session(&self, session_id: SessionId) {
        if let Some(sender) = self.notification_senders.get(&session_id) {
            let _ = sender.try_send(());
        }
    }

    pub fn generate_session_id(&self) -> SessionId {
        self.session_id_gen.generate()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Monotonic seconds since the server started.
    pub fn now_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generation() {
        let gen = SessionIdGenerator::new();
        let id1 = gen.generate();
        let id2 = gen.generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_server_state_default() {
        let state = ServerState::default();
        assert_eq!(state.connection_count(), 0);
    }

    #[test]
    fn test_notify_without_registration_is_harmless() {
        let state = ServerState::new();
        state.notify_session(42);
    }
}
