use async_trait::async_trait;
use exam_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::types::{load_document, session_keys};
use crate::language::{LanguageChoice, LanguageDetector};
use crate::models::text_preview;

pub const PREVIEW_CHARS: usize = 3000;

/// Resolves the output language, then pauses until the solve trigger unless it is already set
pub struct ResolveLanguageTask {
    detector: Arc<LanguageDetector>,
}

impl ResolveLanguageTask {
    pub fn new(detector: Arc<LanguageDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl Task for ResolveLanguageTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let mut document = load_document(&context).await?;
        let choice: LanguageChoice = context
            .get(session_keys::LANGUAGE_CHOICE)
            .await
            .unwrap_or_default();

        let text = document
            .usable_text()
            .ok_or_else(|| FlowError::ContextError("No extracted text to resolve".to_string()))?;
        let language = self.detector.resolve(choice, text);
        let preview = text_preview(text, PREVIEW_CHARS);

        let status = match choice {
            LanguageChoice::Auto => format!("Auto-detected language: {}", language.name()),
            LanguageChoice::Fixed(_) => format!("Selected language: {}", language.name()),
        };
        info!(language = %language, ?choice, "Language resolved");

        document.language = Some(language);
        context.set(session_keys::DOCUMENT, &document).await;

        if context.flag(session_keys::SOLVE_REQUESTED) {
            return Ok(TaskResult::new_with_status(
                None,
                NextAction::ContinueAndExecute,
                Some(status),
            ));
        }

        Ok(TaskResult::new_with_status(
            Some(preview),
            NextAction::Continue,
            Some(status),
        ))
    }
}
