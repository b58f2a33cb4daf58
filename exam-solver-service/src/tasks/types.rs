use exam_flow::{Context, FlowError, Result};

use crate::models::ExamDocument;

/// Context keys shared by the tasks, the solve driver and the HTTP handlers
pub mod session_keys {
    pub const DOCUMENT: &str = "document";
    pub const LANGUAGE_CHOICE: &str = "language_choice";
    pub const EXTRACTION_FAILED: &str = "extraction_failed";
    /// Set by the solve trigger so language resolution runs straight through
    pub const SOLVE_REQUESTED: &str = "solve_requested";
    pub const SOLVING: &str = "solving";
    pub const STOP_REQUESTED: &str = "stop_requested";
    pub const SOLVE_STOPPED: &str = "solve_stopped";
    /// Segments chosen for solving, after filtering and the per-solve cap
    pub const QUESTIONS: &str = "questions";
    pub const NEEDS_LLM_VALIDATION: &str = "needs_llm_validation";
    pub const ANSWERS: &str = "answers";
    /// Text streamed so far for the question in flight
    pub const PARTIAL_ANSWER: &str = "partial_answer";
}

pub async fn load_document(context: &Context) -> Result<ExamDocument> {
    context
        .get(session_keys::DOCUMENT)
        .await
        .ok_or_else(|| FlowError::ContextError("Document not found in context".to_string()))
}
