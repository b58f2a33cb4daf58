use serde::{Deserialize, Serialize};

use crate::language::LanguageCode;

/// Placeholder stored when a question produced no usable answer
pub const INTERRUPTED_ANSWER: &str = "⚠️ Answer was interrupted or empty.";

/// Everything the flow knows about one uploaded exam
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamDocument {
    pub id: String,
    pub pdf_path: String,
    pub file_name: Option<String>,
    pub extracted_text: Option<String>,
    pub language: Option<LanguageCode>,
    pub segments: Vec<String>,
}

impl ExamDocument {
    pub fn new(id: String, pdf_path: String, file_name: Option<String>) -> Self {
        Self {
            id,
            pdf_path,
            file_name,
            ..Self::default()
        }
    }

    /// Extracted text, unless extraction has not run or produced a failure sentinel
    pub fn usable_text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|text| !crate::extract::is_failure_sentinel(text))
    }
}

/// First `max_chars` characters of `text`, with `...` appended when it was cut
pub fn text_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One solved question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// 1-based position in the solve order
    pub index: usize,
    pub question: String,
    pub answer: String,
    /// The stop flag cut the stream short
    pub interrupted: bool,
}

impl AnswerRecord {
    /// Form shown on screen and written to the artifact
    pub fn display(&self) -> String {
        format!("### Q{}:\n{}", self.index, self.answer)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SolveRequest {
    /// `auto`, `en`, `ta` or `si`; keeps the upload-time choice when absent
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub language: LanguageCode,
    pub language_name: String,
    pub characters: usize,
    pub preview: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SolveResponse {
    pub session_id: String,
    pub status: String,
    pub message: Option<String>,
    pub language: Option<LanguageCode>,
    pub answers: Vec<AnswerRecord>,
    pub stopped: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: String,
    pub current_task: String,
    pub status_message: Option<String>,
    pub file_name: Option<String>,
    pub language: Option<LanguageCode>,
    pub question_count: usize,
    pub answers: Vec<AnswerRecord>,
    pub partial_answer: Option<String>,
    pub stop_requested: bool,
}
