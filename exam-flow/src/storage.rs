use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{context::Context, error::Result};

/// One user's pass through a graph.
///
/// Cloning a session shares its [`Context`], so a clone fetched from storage
/// sees values written by a task that is still running on another clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub graph_id: String,
    /// Task that runs on the next `FlowRunner::run`
    pub current_task_id: String,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub context: Context,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        start_task_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            current_task_id: start_task_id.into(),
            status_message: None,
            created_at: Utc::now(),
            context: Context::new(),
        }
    }
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Insert or replace by session id
    async fn save(&self, session: Session) -> Result<()>;
    /// Replace an existing session. Returns `false` and stores nothing when
    /// the id is no longer present, so a deleted session is never written back.
    async fn update(&self, session: Session) -> Result<bool>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    /// Returns the removed session, if there was one
    async fn delete(&self, id: &str) -> Result<Option<Session>>;
}

/// Process-local session store. Sessions do not survive a restart.
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn update(&self, session: Session) -> Result<bool> {
        match self.sessions.get_mut(&session.id) {
            Some(mut entry) => {
                *entry = session;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.remove(id).map(|(_, session)| session))
    }
}
