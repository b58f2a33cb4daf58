use async_trait::async_trait;
use exam_flow::{Context, NextAction, Result, Task, TaskResult};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{load_document, session_keys};
use crate::extract::{TextExtractor, is_failure_sentinel};

pub struct ExtractTextTask {
    extractor: Arc<TextExtractor>,
}

impl ExtractTextTask {
    pub fn new(extractor: Arc<TextExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Task for ExtractTextTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let mut document = load_document(&context).await?;
        info!(pdf = %document.pdf_path, "Starting PDF text extraction");

        let text = self.extractor.extract(Path::new(&document.pdf_path)).await;
        let failed = is_failure_sentinel(&text);
        let chars = text.chars().count();
        document.extracted_text = Some(text.clone());

        context.set(session_keys::DOCUMENT, &document).await;
        context.set(session_keys::EXTRACTION_FAILED, failed).await;

        if failed {
            warn!("Extraction failed, ending flow for this document");
            return Ok(TaskResult::new_with_status(
                Some(text),
                NextAction::End,
                Some("Text extraction failed".to_string()),
            ));
        }

        info!(chars, "Extraction completed");
        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("Extracted {chars} characters")),
        ))
    }
}
