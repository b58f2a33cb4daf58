//! `FlowRunner` wraps the load → execute one step → save cycle.
//!
//! HTTP handlers hold one runner in their state and call [`FlowRunner::run`]
//! per request; the session is written back after every step so the next
//! request picks up where the previous one stopped. A session deleted while
//! its step was running stays deleted.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::{FlowError, Result},
    graph::{ExecutionResult, Graph},
    storage::SessionStorage,
};

#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    /// Execute the session's current step (following `ContinueAndExecute` chains) and
    /// persist the updated session.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        let result = self.graph.execute_session(&mut session).await;

        // Persist even on failure so the status message and position survive
        if !self.storage.update(session).await? {
            warn!(session_id = %session_id, "session removed during step; not saving");
        }

        let result = result?;
        info!(session_id = %session_id, status = ?result.status, "flow step finished");
        Ok(result)
    }
}
