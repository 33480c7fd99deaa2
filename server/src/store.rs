//! Session store
//!
//! The store owns every live [`Session`]. Each session sits behind its own
//! async mutex, which is the serialization point for everything that mutates
//! that session: seat assignment, moves and rematches. The map itself is only
//! locked for lookups, inserts and removals, so work on different sessions
//! runs in parallel.

use crate::session::{Session, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one session; lock it before reading or mutating.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Storage interface for live sessions.
///
/// The session manager depends only on this trait so the in-memory map can
/// be replaced by a sharded or clustered implementation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session under its id. Returns `None` without touching the
    /// store if the id is already taken.
    async fn insert(&self, session: Session) -> Option<SessionHandle>;

    async fn get(&self, id: &SessionId) -> Option<SessionHandle>;

    /// Removes a session. No-op if it doesn't exist.
    async fn remove(&self, id: &SessionId) -> Option<SessionHandle>;

    /// Handles of all live sessions, for periodic sweeps
    async fn all(&self) -> Vec<SessionHandle>;

    async fn len(&self) -> usize;
}

/// Process-local store backed by a hash map.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return None;
        }

        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, Arc::clone(&handle));
        Some(handle)
    }

    async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    async fn all(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Seat;

    fn session(id: &str) -> Session {
        Session::new(
            SessionId::from(id),
            "start".to_string(),
            Seat::new("alice".to_string(), 1),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemorySessionStore::new();
        assert!(store.insert(session("S1")).await.is_some());

        let handle = store.get(&SessionId::from("S1")).await.unwrap();
        assert_eq!(handle.lock().await.id.as_str(), "S1");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemorySessionStore::new();
        assert!(store.insert(session("S1")).await.is_some());
        assert!(store.insert(session("S1")).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemorySessionStore::new();
        store.insert(session("S1")).await;

        assert!(store.remove(&SessionId::from("S1")).await.is_some());
        assert!(store.get(&SessionId::from("S1")).await.is_none());
        assert!(store.remove(&SessionId::from("S1")).await.is_none());
    }

    #[tokio::test]
    async fn test_handles_share_state() {
        let store = InMemorySessionStore::new();
        let handle = store.insert(session("S1")).await.unwrap();
        handle.lock().await.ply = 5;

        let again = store.get(&SessionId::from("S1")).await.unwrap();
        assert_eq!(again.lock().await.ply, 5);
        assert_eq!(store.all().await.len(), 1);
    }
}
