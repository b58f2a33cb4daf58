use async_trait::async_trait;
use exam_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::types::{load_document, session_keys};
use crate::config::QuestionFilter;
use crate::segmenter::{SegmentMode, Segmentation, segment_with_filter};

/// Segments to hand to the next stage, capped at `max_questions`
pub fn select_questions(
    segmentation: &Segmentation,
    filter: QuestionFilter,
    max_questions: usize,
) -> Vec<String> {
    let pool = match filter {
        QuestionFilter::Heuristic => &segmentation.valid,
        QuestionFilter::None | QuestionFilter::Llm => &segmentation.all,
    };
    if pool.len() > max_questions {
        info!(cap = max_questions, found = pool.len(), "Capping question count");
    }
    pool.iter().take(max_questions).cloned().collect()
}

pub struct SegmentQuestionsTask {
    mode: SegmentMode,
    filter: QuestionFilter,
    max_questions: usize,
}

impl SegmentQuestionsTask {
    pub fn new(mode: SegmentMode, filter: QuestionFilter, max_questions: usize) -> Self {
        Self {
            mode,
            filter,
            max_questions,
        }
    }
}

#[async_trait]
impl Task for SegmentQuestionsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let mut document = load_document(&context).await?;
        let text = document
            .usable_text()
            .ok_or_else(|| FlowError::ContextError("No extracted text to segment".to_string()))?;

        let segmentation = segment_with_filter(text, self.mode);
        info!(
            candidates = segmentation.all.len(),
            math_like = segmentation.valid.len(),
            mode = ?self.mode,
            "Split text into candidate questions"
        );

        let questions = select_questions(&segmentation, self.filter, self.max_questions);

        let status = format!("Split into {} candidate questions", segmentation.all.len());
        document.segments = segmentation.all;
        context.set(session_keys::DOCUMENT, &document).await;
        context.set(session_keys::QUESTIONS, &questions).await;
        context
            .set(
                session_keys::NEEDS_LLM_VALIDATION,
                self.filter == QuestionFilter::Llm,
            )
            .await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
