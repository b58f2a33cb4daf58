use async_trait::async_trait;
use exam_flow::{Context, NextAction, Result, Task, TaskResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use super::types::{load_document, session_keys};
use crate::artifact::save_answers;
use crate::driver::solve_questions;
use crate::generator::AnswerGenerator;

pub const NO_QUESTIONS_MESSAGE: &str = "❌ No valid maths questions detected.";
pub const STOPPED_MESSAGE: &str = "⏹ Solving stopped by user.";

pub struct SolveQuestionsTask {
    generator: Arc<dyn AnswerGenerator>,
    syllabus: Option<String>,
    /// Answers go to `<answers_dir>/<document id>/answers.txt`; `None` keeps them in the session only
    answers_dir: Option<PathBuf>,
}

impl SolveQuestionsTask {
    pub fn new(
        generator: Arc<dyn AnswerGenerator>,
        syllabus: Option<String>,
        answers_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            generator,
            syllabus,
            answers_dir,
        }
    }
}

#[async_trait]
impl Task for SolveQuestionsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let document = load_document(&context).await?;
        let questions: Vec<String> = context
            .get(session_keys::QUESTIONS)
            .await
            .unwrap_or_default();

        if questions.is_empty() {
            info!("No questions to solve");
            context.set(session_keys::SOLVE_STOPPED, false).await;
            return Ok(TaskResult::new_with_status(
                Some(NO_QUESTIONS_MESSAGE.to_string()),
                NextAction::End,
                Some("No questions found".to_string()),
            ));
        }

        let language = document.language.unwrap_or_default();
        info!(questions = questions.len(), language = %language, "Solving questions");

        let outcome = solve_questions(
            self.generator.as_ref(),
            &questions,
            language.name(),
            self.syllabus.as_deref(),
            &context,
            |_| {},
        )
        .await;
        context.set(session_keys::SOLVE_STOPPED, outcome.stopped).await;

        if let Some(dir) = self.answers_dir.as_deref().filter(|_| !outcome.answers.is_empty()) {
            if let Err(e) = save_answers(&dir.join(&document.id), &outcome.answers).await {
                error!("Failed to save answers file: {}", e);
            }
        }

        let message = if outcome.stopped {
            STOPPED_MESSAGE.to_string()
        } else {
            format!("Solved {} questions", outcome.answers.len())
        };

        Ok(TaskResult::new_with_status(
            Some(message.clone()),
            NextAction::End,
            Some(message),
        ))
    }
}
