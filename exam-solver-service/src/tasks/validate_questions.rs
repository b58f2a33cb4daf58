use async_trait::async_trait;
use exam_flow::{Context, NextAction, Result, Task, TaskResult};
use rig::agent::Agent;
use rig::completion::Prompt;
use rig::providers::openrouter;
use std::sync::Arc;
use tracing::{error, info};

use super::types::session_keys;
use super::utils::get_llm_agent;

/// Decides whether a segment is a maths question
#[async_trait]
pub trait QuestionValidator: Send + Sync {
    async fn is_math_question(&self, segment: &str) -> anyhow::Result<bool>;
}

const VALIDATOR_PREAMBLE: &str =
    "You classify exam text. Answer with a single word: Yes or No.";

pub struct LlmQuestionValidator {
    agent: Agent<openrouter::CompletionModel>,
}

impl LlmQuestionValidator {
    pub fn new(api_key: &str, model: &str) -> anyhow::Result<Self> {
        Ok(Self {
            agent: get_llm_agent(api_key, model, VALIDATOR_PREAMBLE)?,
        })
    }
}

#[async_trait]
impl QuestionValidator for LlmQuestionValidator {
    async fn is_math_question(&self, segment: &str) -> anyhow::Result<bool> {
        let prompt = format!("Is the following a maths question? Answer Yes or No.\n\n{segment}");
        let reply = self.agent.prompt(&prompt).await?;
        Ok(is_affirmative(&reply))
    }
}

pub fn is_affirmative(reply: &str) -> bool {
    reply.trim().to_ascii_lowercase().starts_with("yes")
}

/// Questions the validator accepts, in order. The flag is true when a validator
/// error cut the pass short.
pub async fn validate_all(
    validator: &dyn QuestionValidator,
    questions: Vec<String>,
) -> (Vec<String>, bool) {
    let mut accepted = Vec::with_capacity(questions.len());
    for question in questions {
        match validator.is_math_question(&question).await {
            Ok(true) => accepted.push(question),
            Ok(false) => {}
            Err(e) => {
                error!("Question validation failed: {}", e);
                return (accepted, true);
            }
        }
    }
    (accepted, false)
}

/// Keeps only the questions the validator accepts. A validator error raises the
/// stop flag so no solving happens on a half-checked list.
pub struct ValidateQuestionsTask {
    validator: Arc<dyn QuestionValidator>,
}

impl ValidateQuestionsTask {
    pub fn new(validator: Arc<dyn QuestionValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Task for ValidateQuestionsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let questions: Vec<String> = context
            .get(session_keys::QUESTIONS)
            .await
            .unwrap_or_default();
        info!(candidates = questions.len(), "Validating questions with LLM");

        let (accepted, failed) = validate_all(self.validator.as_ref(), questions).await;
        if failed {
            context.set(session_keys::STOP_REQUESTED, true).await;
        }

        let status = format!("{} questions accepted", accepted.len());
        info!(accepted = accepted.len(), "Validation completed");
        context.set(session_keys::QUESTIONS, &accepted).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::fixed::KeywordValidator;
    use super::*;

    fn context_with(questions: &[&str]) -> Context {
        let context = Context::new();
        context.set_sync(session_keys::QUESTIONS, questions);
        context
    }

    #[test]
    fn affirmative_replies() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative("  yes, it is."));
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative("Maybe yes"));
    }

    #[tokio::test]
    async fn keeps_accepted_questions_in_order() {
        let context = context_with(&["solve 2x = 4", "write your name", "solve x^2 = 9"]);
        let task = ValidateQuestionsTask::new(Arc::new(KeywordValidator {
            needle: "solve",
            fail_on: None,
        }));

        let result = task.run(context.clone()).await.unwrap();
        assert_eq!(result.next_action, NextAction::ContinueAndExecute);

        let questions: Vec<String> = context.get(session_keys::QUESTIONS).await.unwrap();
        assert_eq!(questions, vec!["solve 2x = 4", "solve x^2 = 9"]);
        assert!(!context.flag(session_keys::STOP_REQUESTED));
    }

    #[tokio::test]
    async fn validator_error_requests_stop() {
        let context = context_with(&["solve 1 + 1", "solve BROKEN", "solve 2 + 2"]);
        let task = ValidateQuestionsTask::new(Arc::new(KeywordValidator {
            needle: "solve",
            fail_on: Some("BROKEN"),
        }));

        task.run(context.clone()).await.unwrap();

        let questions: Vec<String> = context.get(session_keys::QUESTIONS).await.unwrap();
        assert_eq!(questions, vec!["solve 1 + 1"]);
        assert!(context.flag(session_keys::STOP_REQUESTED));
    }
}
