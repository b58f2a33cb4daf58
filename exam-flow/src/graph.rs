use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    context::Context,
    error::{FlowError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Predicate evaluated against the session context when choosing a branch
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Outgoing edge of a task
#[derive(Clone)]
enum Edge {
    Direct(String),
    Branch {
        condition: EdgeCondition,
        yes: String,
        no: String,
    },
}

/// A set of tasks joined by edges, executed one step at a time against a [`Session`]
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, Edge>,
    start_task_id: Option<String>,
}

impl Graph {
    /// Run the session's current task and advance `current_task_id` according to its
    /// [`NextAction`]. `ContinueAndExecute` keeps going within the same call.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let result = self
            .execute_single_task(&session.current_task_id, session.context.clone())
            .await?;

        if result.status_message.is_some() {
            session.status_message = result.status_message.clone();
        }

        match &result.next_action {
            NextAction::Continue => {
                session.current_task_id = self
                    .find_next_task(&result.task_id, &session.context)
                    .unwrap_or_else(|| result.task_id.clone());
                Ok(ExecutionResult::waiting(result.response))
            }
            NextAction::ContinueAndExecute => {
                match self.find_next_task(&result.task_id, &session.context) {
                    Some(next_task_id) => {
                        session.current_task_id = next_task_id;
                        Box::pin(self.execute_session(session)).await
                    }
                    None => {
                        session.current_task_id = result.task_id.clone();
                        Ok(ExecutionResult::waiting(result.response))
                    }
                }
            }
            NextAction::WaitForInput => {
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult::waiting(result.response))
            }
            NextAction::End => {
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Completed,
                })
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;

        debug!(graph = %self.id, task = %task_id, "running task");
        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Resolve the outgoing edge of `current_task_id`, evaluating branch conditions
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        match self.edges.get(current_task_id)? {
            Edge::Direct(to) => Some(to.clone()),
            Edge::Branch { condition, yes, no } => {
                if condition(context) {
                    Some(yes.clone())
                } else {
                    Some(no.clone())
                }
            }
        }
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph {
                id: id.into(),
                tasks: HashMap::new(),
                edges: HashMap::new(),
                start_task_id: None,
            },
        }
    }

    /// Register a task; the first task added becomes the start task
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.start_task_id.is_none() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    /// Unconditional edge. A task has at most one outgoing edge; adding another replaces it.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Two-way branch: `yes` when `condition` holds on the context, `no` otherwise
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.edges.insert(
            from.into(),
            Edge::Branch {
                condition: Arc::new(condition),
                yes: yes.into(),
                no: no.into(),
            },
        );
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of one `execute_session` call
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    fn waiting(response: Option<String>) -> Self {
        Self {
            response,
            status: ExecutionStatus::WaitingForInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The session stopped on a task and needs another run
    WaitingForInput,
    /// The flow reached a task that returned `NextAction::End`
    Completed,
}
