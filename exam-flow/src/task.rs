use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// What a task hands back to the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Returned to whoever called `FlowRunner::run`
    pub response: Option<String>,
    pub next_action: NextAction,
    /// Progress note copied onto the session when present
    pub status_message: Option<String>,
    /// Set by the graph after the task returns
    #[serde(default)]
    pub task_id: String,
}

impl TaskResult {
    pub fn new(response: Option<String>, next_action: NextAction) -> Self {
        Self {
            response,
            next_action,
            status_message: None,
            task_id: String::new(),
        }
    }

    pub fn new_with_status(
        response: Option<String>,
        next_action: NextAction,
        status_message: Option<String>,
    ) -> Self {
        Self {
            status_message,
            ..Self::new(response, next_action)
        }
    }
}

/// Where the session goes after a task returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Advance to the next task and hand control back
    Continue,
    /// Advance and run the next task in the same call
    ContinueAndExecute,
    /// Run this task again on the next call
    WaitForInput,
    End,
}

/// One step of a flow. Tasks share state only through the [`Context`].
#[async_trait]
pub trait Task: Send + Sync {
    /// Graph key of the task; the type name unless overridden
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult>;
}
