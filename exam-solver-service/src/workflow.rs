use exam_flow::{FlowRunner, Graph, GraphBuilder, Session, SessionStorage, Task};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{QuestionFilter, Settings};
use crate::extract::{TextExtractor, is_failure_sentinel};
use crate::generator::{AnswerGenerator, OpenRouterGenerator};
use crate::language::{LanguageChoice, LanguageDetector};
use crate::models::ExamDocument;
use crate::openrouter::OpenRouterClient;
use crate::segmenter::SegmentMode;
use crate::tasks::*;

pub const EXAM_WORKFLOW_ID: &str = "exam_workflow";

/// Knobs for segmentation and solving
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    pub segment_mode: SegmentMode,
    pub question_filter: QuestionFilter,
    pub max_questions: usize,
    pub syllabus: Option<String>,
    pub answers_dir: Option<PathBuf>,
}

/// Long-lived collaborators shared by every session
#[derive(Clone)]
pub struct ExamServices {
    pub extractor: Arc<TextExtractor>,
    pub detector: Arc<LanguageDetector>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub validator: Arc<dyn QuestionValidator>,
    pub options: SolverOptions,
}

impl ExamServices {
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = OpenRouterClient::new(settings.openrouter_api_key.clone());
        let extractor = Arc::new(TextExtractor::new(settings.ocr.clone(), Some(client.clone())));

        let syllabus = match &settings.syllabus_path {
            Some(path) => load_syllabus(&extractor, path).await,
            None => None,
        };

        Ok(Self {
            detector: Arc::new(LanguageDetector::with_lingua(
                settings.output_language.as_deref(),
            )),
            generator: Arc::new(OpenRouterGenerator::new(client, settings.model.clone())),
            validator: Arc::new(LlmQuestionValidator::new(
                &settings.openrouter_api_key,
                &settings.model,
            )?),
            extractor,
            options: SolverOptions {
                segment_mode: settings.segment_mode,
                question_filter: settings.question_filter,
                max_questions: settings.max_questions,
                syllabus,
                answers_dir: Some(settings.answers_dir.clone()),
            },
        })
    }
}

/// Syllabus text from a PDF or a plain text file. Unreadable syllabi are skipped.
pub async fn load_syllabus(extractor: &TextExtractor, path: &Path) -> Option<String> {
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        let text = extractor.extract(path).await;
        if is_failure_sentinel(&text) {
            warn!(path = %path.display(), "Syllabus could not be extracted, continuing without it");
            return None;
        }
        text
    } else {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Syllabus could not be read, continuing without it");
                return None;
            }
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    info!(path = %path.display(), chars = text.len(), "Loaded syllabus");
    Some(text.to_string())
}

/// Identifier a task registers under
pub fn task_id<T: Task>() -> &'static str {
    std::any::type_name::<T>()
}

pub fn build_exam_workflow(services: &ExamServices) -> Graph {
    let options = &services.options;

    let extract_task = Arc::new(ExtractTextTask::new(services.extractor.clone()));
    let extract_id = extract_task.id().to_string();

    let resolve_task = Arc::new(ResolveLanguageTask::new(services.detector.clone()));
    let resolve_id = resolve_task.id().to_string();

    let segment_task = Arc::new(SegmentQuestionsTask::new(
        options.segment_mode,
        options.question_filter,
        options.max_questions,
    ));
    let segment_id = segment_task.id().to_string();

    let validate_task = Arc::new(ValidateQuestionsTask::new(services.validator.clone()));
    let validate_id = validate_task.id().to_string();

    let solve_task = Arc::new(SolveQuestionsTask::new(
        services.generator.clone(),
        options.syllabus.clone(),
        options.answers_dir.clone(),
    ));
    let solve_id = solve_task.id().to_string();

    GraphBuilder::new(EXAM_WORKFLOW_ID)
        .add_task(extract_task)
        .add_task(resolve_task)
        .add_task(segment_task)
        .add_task(validate_task)
        .add_task(solve_task)
        .add_edge(&extract_id, &resolve_id)
        .add_edge(&resolve_id, &segment_id)
        .add_conditional_edge(
            &segment_id,
            |context| context.flag(session_keys::NEEDS_LLM_VALIDATION),
            &validate_id,
            &solve_id,
        )
        .add_edge(&validate_id, &solve_id)
        .build()
}

/// New session positioned at text extraction for the PDF at `pdf_path`.
/// The document shares the session id.
pub async fn create_exam_session(
    pdf_path: String,
    file_name: Option<String>,
    choice: LanguageChoice,
) -> Session {
    let session_id = Uuid::new_v4().to_string();
    let document = ExamDocument::new(session_id.clone(), pdf_path, file_name);

    let session = Session::new(session_id, EXAM_WORKFLOW_ID, task_id::<ExtractTextTask>());
    session.context.set(session_keys::DOCUMENT, &document).await;
    session.context.set(session_keys::LANGUAGE_CHOICE, choice).await;

    session
}

pub fn create_flow_runner(
    services: &ExamServices,
    session_storage: Arc<dyn SessionStorage>,
) -> FlowRunner {
    let graph = Arc::new(build_exam_workflow(services));
    FlowRunner::new(graph, session_storage)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::extract::OcrSettings;
    use crate::generator::scripted::{Script, ScriptedGenerator};
    use crate::language::{LanguageDetector, LanguageIdentifier};
    use crate::tasks::validate_questions::fixed::KeywordValidator;

    struct NoIdentifier;

    impl LanguageIdentifier for NoIdentifier {
        fn identify(&self, _text: &str) -> Option<String> {
            None
        }
    }

    /// Offline services: scripted answers, keyword validation, script-count-only detection
    pub fn services(scripts: Vec<Script>, options: SolverOptions) -> (ExamServices, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(scripts));
        let services = ExamServices {
            extractor: Arc::new(TextExtractor::new(OcrSettings::default(), None)),
            detector: Arc::new(LanguageDetector::new(None, Box::new(NoIdentifier))),
            generator: generator.clone(),
            validator: Arc::new(KeywordValidator {
                needle: "solve",
                fail_on: None,
            }),
            options,
        };
        (services, generator)
    }

    pub fn options() -> SolverOptions {
        SolverOptions {
            max_questions: 15,
            ..SolverOptions::default()
        }
    }
}
