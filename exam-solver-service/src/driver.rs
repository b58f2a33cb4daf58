//! The per-question solve loop, shared by the flow task and the command line.

use exam_flow::Context;
use futures::StreamExt;
use tracing::{info, warn};

use crate::generator::{AnswerGenerator, AnswerRequest};
use crate::models::{AnswerRecord, INTERRUPTED_ANSWER};
use crate::tasks::session_keys;

/// Progress reported while solving
#[derive(Debug)]
pub enum SolveEvent<'a> {
    Started { index: usize, question: &'a str },
    Fragment { index: usize, text: &'a str },
    Finished(&'a AnswerRecord),
}

#[derive(Debug, Default)]
pub struct SolveOutcome {
    pub answers: Vec<AnswerRecord>,
    /// The stop flag ended the run before every question was answered
    pub stopped: bool,
}

/// Solve `questions` in order, honouring the stop flag in `context` between
/// questions and between fragments.
///
/// The growing answer list is mirrored to `session_keys::ANSWERS` after every
/// question and the text in flight to `session_keys::PARTIAL_ANSWER`.
pub async fn solve_questions<F>(
    generator: &dyn AnswerGenerator,
    questions: &[String],
    language_name: &str,
    syllabus: Option<&str>,
    context: &Context,
    mut on_event: F,
) -> SolveOutcome
where
    F: FnMut(SolveEvent<'_>) + Send,
{
    let mut outcome = SolveOutcome::default();

    for (offset, question) in questions.iter().enumerate() {
        let index = offset + 1;
        if context.flag(session_keys::STOP_REQUESTED) {
            info!(index, "Stop requested, skipping remaining questions");
            outcome.stopped = true;
            break;
        }

        on_event(SolveEvent::Started { index, question });
        let request = AnswerRequest::new(question.as_str(), language_name)
            .with_syllabus(syllabus.map(str::to_string));

        let (answer, interrupted) =
            stream_answer(generator, &request, index, context, &mut on_event).await;

        let record = AnswerRecord {
            index,
            question: question.clone(),
            answer,
            interrupted,
        };
        on_event(SolveEvent::Finished(&record));
        outcome.answers.push(record);

        context.remove(session_keys::PARTIAL_ANSWER).await;
        context.set(session_keys::ANSWERS, &outcome.answers).await;

        if interrupted {
            outcome.stopped = true;
            break;
        }
    }

    info!(
        answered = outcome.answers.len(),
        total = questions.len(),
        stopped = outcome.stopped,
        "Solve loop finished"
    );
    outcome
}

/// Returns the answer text and whether the stop flag cut it short
async fn stream_answer<F>(
    generator: &dyn AnswerGenerator,
    request: &AnswerRequest,
    index: usize,
    context: &Context,
    on_event: &mut F,
) -> (String, bool)
where
    F: FnMut(SolveEvent<'_>) + Send,
{
    let mut stream = match generator.stream_answer(request).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(index, error = %e, "Answer generation failed");
            return (INTERRUPTED_ANSWER.to_string(), false);
        }
    };

    let mut partial = String::new();
    let mut interrupted = false;
    while let Some(fragment) = stream.next().await {
        if context.flag(session_keys::STOP_REQUESTED) {
            interrupted = true;
            break;
        }
        match fragment {
            Ok(text) => {
                partial.push_str(&text);
                on_event(SolveEvent::Fragment { index, text: &text });
                context.set_sync(session_keys::PARTIAL_ANSWER, &partial);
            }
            Err(e) => {
                warn!(index, error = %e, "Answer stream failed");
                return (INTERRUPTED_ANSWER.to_string(), false);
            }
        }
    }

    let answer = partial.trim();
    if answer.is_empty() {
        return (INTERRUPTED_ANSWER.to_string(), interrupted);
    }
    (answer.to_string(), interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::scripted::{Script, ScriptedGenerator};
    use crate::openrouter::FragmentStream;
    use async_trait::async_trait;

    fn questions(items: &[&str]) -> Vec<String> {
        items.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn answers_every_question_in_order() {
        let generator = ScriptedGenerator::new(vec![
            Script::Fragments(vec!["Step 1\n", "Final Answer: 4"]),
            Script::Fragments(vec!["Final Answer: 9"]),
        ]);
        let context = Context::new();
        let mut fragments = Vec::new();

        let outcome = solve_questions(
            &generator,
            &questions(&["2 + 2", "3 * 3"]),
            "English",
            None,
            &context,
            |event| {
                if let SolveEvent::Fragment { index, text } = event {
                    fragments.push(format!("{index}:{text}"));
                }
            },
        )
        .await;

        assert!(!outcome.stopped);
        assert_eq!(outcome.answers.len(), 2);
        assert_eq!(outcome.answers[0].answer, "Step 1\nFinal Answer: 4");
        assert_eq!(outcome.answers[1].index, 2);
        assert_eq!(fragments, vec!["1:Step 1\n", "1:Final Answer: 4", "2:Final Answer: 9"]);

        let stored: Vec<AnswerRecord> = context.get(session_keys::ANSWERS).await.unwrap();
        assert_eq!(stored, outcome.answers);
        assert!(!context.contains(session_keys::PARTIAL_ANSWER));
    }

    #[tokio::test]
    async fn failures_and_empty_answers_become_placeholders() {
        let generator = ScriptedGenerator::new(vec![
            Script::FailToStart,
            Script::FailAfter(vec!["Step 1"]),
            Script::Fragments(vec!["  ", "\n"]),
            Script::Fragments(vec!["Final Answer: 1"]),
        ]);
        let context = Context::new();

        let outcome = solve_questions(
            &generator,
            &questions(&["a", "b", "c", "d"]),
            "English",
            None,
            &context,
            |_| {},
        )
        .await;

        let answers: Vec<&str> = outcome.answers.iter().map(|a| a.answer.as_str()).collect();
        assert_eq!(
            answers,
            vec![INTERRUPTED_ANSWER, INTERRUPTED_ANSWER, INTERRUPTED_ANSWER, "Final Answer: 1"]
        );
        assert!(outcome.answers.iter().all(|a| !a.interrupted));
        assert!(!outcome.stopped);
    }

    #[tokio::test]
    async fn stop_before_start_answers_nothing() {
        let generator = ScriptedGenerator::new(vec![]);
        let context = Context::new();
        context.set(session_keys::STOP_REQUESTED, true).await;

        let outcome =
            solve_questions(&generator, &questions(&["a", "b"]), "Tamil", None, &context, |_| {})
                .await;

        assert!(outcome.stopped);
        assert!(outcome.answers.is_empty());
        assert_eq!(generator.calls(), 0);
    }

    /// Raises the stop flag while producing its second fragment
    struct StoppingGenerator {
        context: Context,
    }

    #[async_trait]
    impl AnswerGenerator for StoppingGenerator {
        async fn stream_answer(&self, _request: &AnswerRequest) -> anyhow::Result<FragmentStream> {
            let context = self.context.clone();
            let parts = vec!["Step 1: half", " of the answer", " never seen"];
            Ok(Box::pin(futures::stream::iter(parts).enumerate().map(
                move |(i, part)| {
                    if i == 1 {
                        context.set_sync(session_keys::STOP_REQUESTED, true);
                    }
                    Ok::<String, anyhow::Error>(part.to_string())
                },
            )))
        }
    }

    #[tokio::test]
    async fn stop_mid_stream_keeps_partial_text() {
        let context = Context::new();
        let generator = StoppingGenerator {
            context: context.clone(),
        };

        let outcome =
            solve_questions(&generator, &questions(&["a", "b"]), "English", None, &context, |_| {})
                .await;

        assert!(outcome.stopped);
        assert_eq!(outcome.answers.len(), 1);
        assert!(outcome.answers[0].interrupted);
        assert_eq!(outcome.answers[0].answer, "Step 1: half");
    }

    #[tokio::test]
    async fn syllabus_and_language_reach_the_generator() {
        let generator = ScriptedGenerator::new(vec![]);
        let context = Context::new();

        solve_questions(
            &generator,
            &questions(&["integrate x"]),
            "Sinhala",
            Some("Unit 2"),
            &context,
            |_| {},
        )
        .await;

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].language_name, "Sinhala");
        assert_eq!(requests[0].syllabus.as_deref(), Some("Unit 2"));
    }
}
