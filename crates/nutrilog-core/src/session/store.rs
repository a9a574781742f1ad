//! Session store abstraction.
//!
//! The cross-user session table is injected into the engine so it can
//! be swapped for a distributed store without touching processors.
//! Each session is wrapped in its own `Mutex`; the engine holds that
//! lock for a whole turn, which serializes one user's turns while
//! different users proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::model::Session;

/// Shared handle to one user's session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// An abstract per-user session table with atomic get-or-create.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the user's session, creating a fresh one if absent.
    async fn get_or_create(&self, user_id: &str) -> SessionHandle;

    /// Returns the user's session if one exists.
    async fn get(&self, user_id: &str) -> Option<SessionHandle>;

    /// Removes the user's session.
    async fn remove(&self, user_id: &str);

    /// All user ids with a session, for expiry sweeping.
    async fn user_ids(&self) -> Vec<String>;
}

/// In-memory session table.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        // Fast path under the read lock.
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(user_id) {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id))))
            .clone()
    }

    async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).cloned()
    }

    async fn remove(&self, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id);
    }

    async fn user_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_stable_per_user() {
        let store = InMemorySessionStore::new();
        let first = store.get_or_create("u1").await;
        let second = store.get_or_create("u1").await;
        assert!(Arc::ptr_eq(&first, &second));

        let other = store.get_or_create("u2").await;
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn remove_clears_the_session() {
        let store = InMemorySessionStore::new();
        store.get_or_create("u1").await;
        store.remove("u1").await;
        assert!(store.get("u1").await.is_none());
        assert!(store.user_ids().await.is_empty());
    }
}
