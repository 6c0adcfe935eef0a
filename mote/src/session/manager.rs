//! Session manager: a cheap, consistent view of a session's messages and
//! metadata over write-through persistence.

use std::sync::Arc;

use crate::error::EngineError;
use crate::message::{Message, Role, ToolCall};

use super::cache::SessionCache;
use super::store::SessionStore;
use super::types::{Run, RunState, Scenario, Session};

/// Owns the session cache and mediates every read/write against the
/// persistence boundary. Orchestrators never touch the cache or the store
/// directly; they hold only a reference to the manager.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: SessionCache,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: SessionCache::new(cache_capacity),
        }
    }

    /// Returns the cached session, loading from persistence on miss.
    pub async fn get(&self, id: &str) -> Result<Session, EngineError> {
        if let Some(session) = self.cache.get_session(id) {
            return Ok(session);
        }
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        let messages = self.store.get_messages(id).await?;
        self.cache.put(session.clone(), messages);
        Ok(session)
    }

    /// Creates the session with the given id if it does not already exist.
    pub async fn get_or_create(
        &self,
        id: &str,
        scenario: Scenario,
    ) -> Result<Session, EngineError> {
        match self.get(id).await {
            Ok(session) => Ok(session),
            Err(EngineError::SessionNotFound(_)) => {
                let session = Session::new(id, scenario);
                self.store.create_session(session.clone()).await?;
                self.cache.put(session.clone(), Vec::new());
                Ok(session)
            }
            Err(e) => Err(e),
        }
    }

    /// Allocates a fresh session id.
    pub async fn create(&self, scenario: Scenario) -> Result<Session, EngineError> {
        let session = Session::new(uuid::Uuid::new_v4().to_string(), scenario);
        self.store.create_session(session.clone()).await?;
        self.cache.put(session.clone(), Vec::new());
        Ok(session)
    }

    /// Persists first, then updates the cache (write-through). Returns the
    /// stored message including its assigned id and timestamp.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_call_id: Option<String>,
    ) -> Result<Message, EngineError> {
        // Ensure the session is resident so an append after a cold cache
        // still has the prior history loaded before the new message lands.
        self.get(session_id).await?;

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.into(),
            tool_calls,
            tool_call_id,
            created_at: chrono::Utc::now(),
        };
        let stored = self.store.add_message(message).await?;
        self.cache.append_message(session_id, stored.clone());
        Ok(stored)
    }

    /// Returns cached messages in creation order, loading from persistence
    /// on miss.
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, EngineError> {
        if let Some(messages) = self.cache.get_messages(session_id) {
            return Ok(messages);
        }
        self.get(session_id).await?;
        self.cache
            .get_messages(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Transactional replace used by compaction. The cache reflects the new
    /// list and is marked clean only after the store confirms the write.
    pub async fn replace_messages(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), EngineError> {
        self.store
            .replace_messages(session_id, messages.clone())
            .await?;
        self.cache.replace_messages(session_id, messages);
        Ok(())
    }

    /// Overwrites a session's metadata, used by the PDA engine to persist
    /// its frame stack at each checkpoint boundary.
    pub async fn set_metadata(
        &self,
        session_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.get(session_id).await?;
        self.store.update_metadata(session_id, metadata.clone()).await?;
        self.cache.set_metadata(session_id, metadata);
        Ok(())
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), EngineError> {
        self.store.delete_session(session_id).await?;
        self.cache.invalidate(session_id);
        Ok(())
    }

    /// Cache-only: drops the resident entry without touching persistence.
    pub fn invalidate(&self, session_id: &str) {
        self.cache.invalidate(session_id);
    }

    /// Cache-only: drops every resident entry.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Records a new `Pending` run for `session_id`. Runs are not cached:
    /// callers that need the latest state call [`Self::get_run`].
    pub async fn create_run(
        &self,
        session_id: &str,
        input: impl Into<String>,
    ) -> Result<Run, EngineError> {
        self.store.create_run(Run::new(session_id, input)).await
    }

    /// Moves `run_id` to `next`, per [`RunState::can_transition_to`].
    pub async fn transition_run(
        &self,
        run_id: &str,
        next: RunState,
        output: Option<String>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        self.store.transition_run(run_id, next, output, error).await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError> {
        self.store.get_run(run_id).await
    }
}
