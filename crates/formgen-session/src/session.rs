//! Explicit session handles
//!
//! A [`SessionContext`] is the only way workflow code touches session state.
//! It is passed by reference into every operation and can be cloned into a
//! background job as an `Arc`.

use crate::ids::SessionId;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Per-browser-session key/value store
pub trait SessionContext: Send + Sync + Debug {
    /// Session this context belongs to
    fn id(&self) -> SessionId;

    /// Read a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: Value);

    /// Remove a value
    fn clear(&self, key: &str);
}

/// Session backed by process memory
#[derive(Debug)]
pub struct InMemorySession {
    id: SessionId,
    values: RwLock<HashMap<String, Value>>,
}

impl InMemorySession {
    /// Create empty session
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl SessionContext for InMemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    fn clear(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// Registry of live in-memory sessions
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<InMemorySession>>,
}

impl SessionStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session
    pub fn create(&self) -> Arc<InMemorySession> {
        let id = SessionId::new();
        let session = Arc::new(InMemorySession::new(id));
        self.sessions.insert(id, Arc::clone(&session));
        tracing::debug!(session_id = %id, "session created");
        session
    }

    /// Existing session, or a fresh one under the given id
    pub fn open(&self, id: SessionId) -> Arc<InMemorySession> {
        Arc::clone(
            self.sessions
                .entry(id)
                .or_insert_with(|| Arc::new(InMemorySession::new(id)))
                .value(),
        )
    }

    /// Look up a session without creating it
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<InMemorySession>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Drop a session and everything stored in it
    pub fn remove(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no live sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_clear() {
        let session = InMemorySession::new(SessionId::new());
        assert!(session.get("k").is_none());

        session.set("k", json!({"a": 1}));
        assert_eq!(session.get("k"), Some(json!({"a": 1})));

        session.set("k", json!(2));
        assert_eq!(session.get("k"), Some(json!(2)));

        session.clear("k");
        assert!(session.get("k").is_none());
        assert!(session.is_empty());
    }

    #[test]
    fn store_open_returns_same_session() {
        let store = SessionStore::new();
        let created = store.create();
        created.set("k", json!(true));

        let reopened = store.open(created.id());
        assert_eq!(reopened.get("k"), Some(json!(true)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_remove_forgets_session() {
        let store = SessionStore::new();
        let id = store.create().id();
        store.remove(id);
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn usable_as_trait_object() {
        let session: Arc<dyn SessionContext> = Arc::new(InMemorySession::new(SessionId::new()));
        session.set("x", json!("y"));
        assert_eq!(session.get("x"), Some(json!("y")));
    }
}
