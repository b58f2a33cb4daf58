use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::openrouter::{FragmentStream, OpenRouterClient};

pub const NOT_RELATED_LINE: &str = "This question is not related to maths.";

/// Everything the model needs to solve one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub language_name: String,
    /// Topic constraint, usually the text of a syllabus document
    pub syllabus: Option<String>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>, language_name: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            language_name: language_name.into(),
            syllabus: None,
        }
    }

    pub fn with_syllabus(mut self, syllabus: Option<String>) -> Self {
        self.syllabus = syllabus;
        self
    }
}

/// Produces a step-by-step solution for a question
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Incremental delivery: fragments are concatenated in arrival order
    async fn stream_answer(&self, request: &AnswerRequest) -> anyhow::Result<FragmentStream>;

    /// All-at-once delivery
    async fn answer(&self, request: &AnswerRequest) -> anyhow::Result<String> {
        let mut stream = self.stream_answer(request).await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}

pub fn build_solver_prompt(request: &AnswerRequest) -> String {
    let language = &request.language_name;
    let syllabus = match request.syllabus.as_deref().map(str::trim) {
        Some(syllabus) if !syllabus.is_empty() => format!(
            "\nOnly use methods covered by this syllabus:\n{syllabus}\n"
        ),
        _ => String::new(),
    };

    format!(
        r#"You are a Maths problem resolver.
Write ALL answers in {language} ONLY. Do not mix in any other language.
{syllabus}
Question:
{question}

Rules:
- Check whether the question is related to maths.
- If it is not, reply only with "{NOT_RELATED_LINE}" and do not solve it.
- Do not translate the question; solve it as written.
- Provide EXACTLY 5 steps labeled Step 1 ... Step 5.
- Format:

Step 1: ...
Step 2: ...
Step 3: ...
Step 4: ...
Step 5: ...
Final Answer: ..."#,
        question = request.question.trim(),
    )
}

/// [`AnswerGenerator`] that streams from an OpenRouter-hosted model
pub struct OpenRouterGenerator {
    client: OpenRouterClient,
    model: String,
    temperature: f32,
}

impl OpenRouterGenerator {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.7,
        }
    }

}

#[async_trait]
impl AnswerGenerator for OpenRouterGenerator {
    async fn stream_answer(&self, request: &AnswerRequest) -> anyhow::Result<FragmentStream> {
        let prompt = build_solver_prompt(request);
        info!(
            model = %self.model,
            language = %request.language_name,
            question_chars = request.question.len(),
            "requesting streamed answer"
        );
        self.client
            .stream_chat(&self.model, &prompt, self.temperature)
            .await
    }
}
