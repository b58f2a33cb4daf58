use axum::{
    Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use exam_flow::{Context, FlowRunner, InMemorySessionStorage, Session, SessionStorage};
use serde_json::{Value, json};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    artifact::{ANSWERS_FILE_NAME, render_answers},
    config::Settings,
    language::LanguageChoice,
    models::{
        AnswerRecord, ExamDocument, SessionResponse, SolveRequest, SolveResponse, UploadResponse,
        text_preview,
    },
    tasks::{ResolveLanguageTask, resolve_language::PREVIEW_CHARS, session_keys},
    workflow::{ExamServices, create_exam_session, create_flow_runner, task_id},
};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn conflict_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn unprocessable_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub flow_runner: FlowRunner,
    pub upload_dir: PathBuf,
}

pub async fn create_app(settings: Settings) -> anyhow::Result<Router> {
    let services = ExamServices::from_settings(&settings).await?;
    let app_state = create_app_state(&services, settings.upload_dir);
    Ok(build_router(app_state))
}

pub fn create_app_state(services: &ExamServices, upload_dir: PathBuf) -> AppState {
    let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
    let flow_runner = create_flow_runner(services, session_storage.clone());

    AppState {
        session_storage,
        flow_runner,
        upload_dir,
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/exam/upload", post(upload_exam))
        .route(
            "/exam/{session_id}",
            get(get_session_status).delete(delete_session),
        )
        .route("/exam/{session_id}/solve", post(solve_exam))
        .route("/exam/{session_id}/stop", post(stop_solving))
        .route("/exam/{session_id}/answers.txt", get(download_answers))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request with an `x-correlation-id` and runs it inside a span carrying it
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert("x-correlation-id", value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

async fn root() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn parse_language_choice(raw: &str) -> Result<LanguageChoice, ApiError> {
    raw.parse::<LanguageChoice>()
        .map_err(|e| bad_request_error(&e.to_string()))
}

async fn upload_exam(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let mut upload: Option<(Option<String>, Bytes)> = None;
    let mut choice = LanguageChoice::Auto;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request_error(&format!("Failed to read upload: {e}")))?;
                upload = Some((file_name, bytes));
            }
            "language" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request_error(&format!("Invalid language field: {e}")))?;
                choice = parse_language_choice(&value)?;
            }
            other => warn!(field = %other, "Ignoring unknown upload field"),
        }
    }

    let (file_name, bytes) = upload
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| bad_request_error("A PDF file is required in the 'file' field"))?;
    info!(file_name = ?file_name, bytes = bytes.len(), "Received exam upload");

    let pdf_path = store_upload(&state.upload_dir, &bytes).await?;
    let session = create_exam_session(pdf_path.display().to_string(), file_name, choice).await;
    let session_id = session.id.clone();
    let context = session.context.clone();

    save_session(&state, session).await?;
    let result = state.flow_runner.run(&session_id).await.map_err(|e| {
        error!("Failed to process upload for session {}: {}", session_id, e);
        internal_error("Failed to process uploaded exam", &e.to_string())
    })?;

    let document = document_of(&context).await?;
    let Some(text) = document.usable_text() else {
        let message = document
            .extracted_text
            .clone()
            .or(result.response)
            .unwrap_or_else(|| "Text extraction failed".to_string());
        return Err(unprocessable_error(&message, &session_id));
    };

    let language = document.language.unwrap_or_default();
    info!(session_id = %session_id, language = %language, "Exam ready to solve");

    Ok(Json(UploadResponse {
        session_id,
        language,
        language_name: language.name().to_string(),
        characters: text.chars().count(),
        preview: result
            .response
            .unwrap_or_else(|| text_preview(text, PREVIEW_CHARS)),
    }))
}

async fn store_upload(upload_dir: &FsPath, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    let path = upload_dir.join(format!("{}.pdf", Uuid::new_v4()));
    let write = async {
        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(&path, bytes).await
    };
    write.await.map_err(|e| {
        error!("Failed to store upload: {}", e);
        internal_error("Failed to store uploaded file", &e.to_string())
    })?;
    Ok(path)
}

async fn save_session(state: &AppState, session: Session) -> Result<(), ApiError> {
    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to save session: {}", e);
        internal_error("Failed to save exam session", &e.to_string())
    })
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

async fn document_of(context: &Context) -> Result<ExamDocument, ApiError> {
    crate::tasks::types::load_document(context)
        .await
        .map_err(|e| internal_error("Session has no document", &e.to_string()))
}

/// Releases a claimed solve when the run ends, however it ends
struct SolvingGuard {
    context: Context,
}

impl Drop for SolvingGuard {
    fn drop(&mut self) {
        self.context.set_sync(session_keys::SOLVING, false);
        self.context.set_sync(session_keys::SOLVE_REQUESTED, false);
    }
}

async fn solve_exam(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<SolveResponse> {
    let request: SolveRequest = if body.is_empty() {
        SolveRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request_error(&format!("Invalid request body: {e}")))?
    };

    let mut session = load_session(&state, &session_id).await?;
    let context = session.context.clone();

    let document = document_of(&context).await?;
    if document.usable_text().is_none() {
        return Err(unprocessable_error(
            "No extracted text available for this session",
            &session_id,
        ));
    }
    let choice = request
        .language
        .as_deref()
        .map(parse_language_choice)
        .transpose()?;
    if !context.try_claim(session_keys::SOLVING) {
        return Err(conflict_error(
            "Solving is already in progress for this session",
            &session_id,
        ));
    }
    let guard = SolvingGuard {
        context: context.clone(),
    };

    if let Some(choice) = choice {
        context.set(session_keys::LANGUAGE_CHOICE, choice).await;
    }
    context.set(session_keys::STOP_REQUESTED, false).await;
    context.set(session_keys::SOLVE_STOPPED, false).await;
    context.set(session_keys::SOLVE_REQUESTED, true).await;
    context
        .set(session_keys::ANSWERS, Vec::<AnswerRecord>::new())
        .await;
    context.remove(session_keys::PARTIAL_ANSWER).await;

    session.current_task_id = task_id::<ResolveLanguageTask>().to_string();
    match state.session_storage.update(session).await {
        Ok(true) => {}
        Ok(false) => return Err(not_found_error("Session not found", &session_id)),
        Err(e) => {
            error!("Failed to save session: {}", e);
            return Err(internal_error("Failed to save exam session", &e.to_string()));
        }
    }

    info!(session_id = %session_id, "Solving started");
    // Runs to the end even if the client goes away; the guard clears the flags when it does
    let runner = state.flow_runner.clone();
    let run_id = session_id.clone();
    let solve = tokio::spawn(
        async move {
            let _guard = guard;
            runner.run(&run_id).await
        }
        .instrument(tracing::Span::current()),
    );

    let result = solve
        .await
        .map_err(|e| {
            error!("Solve task for session {} aborted: {}", session_id, e);
            internal_error("Solving failed", &e.to_string())
        })?
        .map_err(|e| {
            error!("Solving failed for session {}: {}", session_id, e);
            internal_error("Solving failed", &e.to_string())
        })?;

    let answers: Vec<AnswerRecord> = context
        .get(session_keys::ANSWERS)
        .await
        .unwrap_or_default();
    let stopped = context.flag(session_keys::SOLVE_STOPPED);
    let language = document_of(&context).await?.language;
    info!(
        session_id = %session_id,
        answers = answers.len(),
        stopped,
        "Solving finished"
    );

    Ok(Json(SolveResponse {
        session_id,
        status: if stopped { "stopped" } else { "completed" }.to_string(),
        message: result.response,
        language,
        answers,
        stopped,
    }))
}

async fn stop_solving(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;
    session
        .context
        .set(session_keys::STOP_REQUESTED, true)
        .await;
    let solving = session.context.flag(session_keys::SOLVING);
    info!(session_id = %session_id, solving, "Stop requested");

    Ok(Json(json!({
        "session_id": session_id,
        "stop_requested": true,
        "solving": solving
    })))
}

fn session_status(context: &Context, answers: &[AnswerRecord]) -> &'static str {
    if context.flag(session_keys::EXTRACTION_FAILED) {
        "failed"
    } else if context.flag(session_keys::SOLVING) {
        "solving"
    } else if context.flag(session_keys::SOLVE_STOPPED) {
        "stopped"
    } else if !answers.is_empty() {
        "completed"
    } else {
        "ready"
    }
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let context = &session.context;

    let document: Option<ExamDocument> = context.get(session_keys::DOCUMENT).await;
    let questions: Vec<String> = context
        .get(session_keys::QUESTIONS)
        .await
        .unwrap_or_default();
    let answers: Vec<AnswerRecord> = context
        .get(session_keys::ANSWERS)
        .await
        .unwrap_or_default();

    Ok(Json(SessionResponse {
        session_id: session.id.clone(),
        status: session_status(context, &answers).to_string(),
        current_task: session.current_task_id.clone(),
        status_message: session.status_message.clone(),
        file_name: document.as_ref().and_then(|d| d.file_name.clone()),
        language: document.and_then(|d| d.language),
        question_count: questions.len(),
        answers,
        partial_answer: context.get(session_keys::PARTIAL_ANSWER).await,
        stop_requested: context.flag(session_keys::STOP_REQUESTED),
    }))
}

/// Drops the session, raising its stop flag for any solve still running, and
/// removes the uploaded PDF
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = match state.session_storage.delete(&session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(not_found_error("Session not found", &session_id)),
        Err(e) => {
            error!("Failed to delete session {}: {}", session_id, e);
            return Err(internal_error("Failed to delete session", &e.to_string()));
        }
    };
    session
        .context
        .set(session_keys::STOP_REQUESTED, true)
        .await;

    let upload = session
        .context
        .get::<ExamDocument>(session_keys::DOCUMENT)
        .await
        .map(|document| PathBuf::from(document.pdf_path))
        .filter(|path| path.starts_with(&state.upload_dir));
    if let Some(path) = upload {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
        }
    }
    info!(session_id = %session_id, "Session deleted");

    Ok(Json(json!({
        "session_id": session_id,
        "deleted": true
    })))
}

async fn download_answers(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session = load_session(&state, &session_id).await?;
    let answers: Vec<AnswerRecord> = session
        .context
        .get(session_keys::ANSWERS)
        .await
        .unwrap_or_default();

    if answers.is_empty() {
        return Err(not_found_error("No answers available yet", &session_id));
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ANSWERS_FILE_NAME}\""),
            ),
        ],
        render_answers(&answers),
    )
        .into_response())
}
