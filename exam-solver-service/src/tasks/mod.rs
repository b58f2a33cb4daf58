pub mod extract_text;
pub mod resolve_language;
pub mod segment_questions;
pub mod solve_questions;
pub mod types;
pub mod utils;
pub mod validate_questions;

pub use extract_text::ExtractTextTask;
pub use resolve_language::ResolveLanguageTask;
pub use segment_questions::SegmentQuestionsTask;
pub use solve_questions::SolveQuestionsTask;
pub use types::session_keys;
pub use validate_questions::{LlmQuestionValidator, QuestionValidator, ValidateQuestionsTask};
