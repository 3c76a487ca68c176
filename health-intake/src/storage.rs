use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::session::{IntakeSession, SessionHandle};

/// A stored session: the session behind its own lock plus a close handle
/// that works while the lock is held by an in-flight message.
#[derive(Clone)]
pub struct SessionEntry {
    handle: SessionHandle,
    session: Arc<Mutex<IntakeSession>>,
}

impl SessionEntry {
    pub fn new(session: IntakeSession) -> Self {
        Self {
            handle: session.handle(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Waits for exclusive access. Messages for the same session queue here.
    pub async fn lock(&self) -> MutexGuard<'_, IntakeSession> {
        self.session.lock().await
    }
}

/// Trait for storing and retrieving intake sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stores `session` unless one with the same id exists; returns the
    /// stored entry either way.
    async fn save(&self, session: IntakeSession) -> Result<SessionEntry>;
    async fn get(&self, id: &str) -> Result<Option<SessionEntry>>;
    /// Removes and closes the session. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: IntakeSession) -> Result<SessionEntry> {
        let entry = self
            .sessions
            .entry(session.id().to_string())
            .or_insert_with(|| SessionEntry::new(session));
        Ok(entry.value().clone())
    }

    async fn get(&self, id: &str) -> Result<Option<SessionEntry>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        match self.sessions.remove(id) {
            Some((_, entry)) => {
                entry.handle().close();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;
    use crate::risk::RiskEngine;

    fn session(id: &str) -> IntakeSession {
        let config = IntakeConfig::default();
        IntakeSession::new(id, &config, RiskEngine::from_config(&config))
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let storage = InMemorySessionStorage::new();
        let entry = storage.save(session("a")).await.unwrap();
        assert_eq!(entry.id(), "a");

        let loaded = storage.get("a").await.unwrap().unwrap();
        loaded.lock().await.start().unwrap();
        assert_eq!(entry.lock().await.conversation().len(), 1);

        assert!(storage.delete("a").await.unwrap());
        assert!(entry.handle().is_closed());
        assert!(storage.get("a").await.unwrap().is_none());
        assert!(!storage.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_keeps_existing_session() {
        let storage = InMemorySessionStorage::new();
        let first = storage.save(session("a")).await.unwrap();
        first.lock().await.start().unwrap();

        let second = storage.save(session("a")).await.unwrap();
        assert_eq!(second.lock().await.conversation().len(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let storage = InMemorySessionStorage::new();
        let a = storage.save(session("a")).await.unwrap();
        let b = storage.save(session("b")).await.unwrap();

        a.lock().await.handle_message("I'm 45").await.unwrap();
        assert_eq!(a.lock().await.record().age(), Some(45));
        assert_eq!(b.lock().await.record().age(), None);
    }
}
