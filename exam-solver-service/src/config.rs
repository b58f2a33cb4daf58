use std::path::PathBuf;
use thiserror::Error;

use crate::extract::{OcrBackend, OcrSettings};
use crate::segmenter::SegmentMode;

pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_MAX_QUESTIONS: usize = 15;
pub const DEFAULT_PORT: u16 = 3000;
const DEV_TESSERACT_CMD: &str = "/usr/bin/tesseract";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which segments get sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuestionFilter {
    /// Every segment
    #[default]
    None,
    /// Only segments that look mathematical
    Heuristic,
    /// Ask the model whether each segment is a maths question
    Llm,
}

impl std::str::FromStr for QuestionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            other => Err(format!("unknown question filter '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openrouter_api_key: String,
    pub model: String,
    /// Raw `OUTPUT_LANGUAGE`; the detector ignores unsupported codes
    pub output_language: Option<String>,
    pub ocr: OcrSettings,
    pub segment_mode: SegmentMode,
    pub question_filter: QuestionFilter,
    pub max_questions: usize,
    pub syllabus_path: Option<PathBuf>,
    pub answers_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub port: u16,
}

/// OCR settings alone. Extraction needs no API key unless the vision backend is chosen.
pub fn ocr_from_env() -> Result<OcrSettings, ConfigError> {
    ocr_from_lookup(|name| std::env::var(name).ok())
}

pub fn ocr_from_lookup<F>(lookup: F) -> Result<OcrSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let mut ocr = OcrSettings::default();
    if let Some(backend) = var("OCR_BACKEND") {
        ocr.backend = parse_with("OCR_BACKEND", backend, str::parse::<OcrBackend>)?;
    }
    if let Some(languages) = var("OCR_LANGUAGES") {
        ocr.languages = languages;
    }
    if let Some(model) = var("OCR_VISION_MODEL") {
        ocr.vision_model = model;
    }
    if var("ENVIRONMENT").as_deref() == Some("dev") {
        ocr.tesseract_cmd = PathBuf::from(DEV_TESSERACT_CMD);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        ocr.tessdata_prefix = Some(cwd.join("tessdata"));
    }
    Ok(ocr)
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source, so tests never touch the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let openrouter_api_key =
            var("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;
        let ocr = ocr_from_lookup(&lookup)?;

        let segment_mode = match var("SEGMENT_MODE") {
            Some(value) => parse_with("SEGMENT_MODE", value, str::parse::<SegmentMode>)?,
            None => SegmentMode::default(),
        };
        let question_filter = match var("QUESTION_FILTER") {
            Some(value) => parse_with("QUESTION_FILTER", value, str::parse::<QuestionFilter>)?,
            None => QuestionFilter::default(),
        };
        let max_questions = match var("MAX_QUESTIONS") {
            Some(value) => parse_with("MAX_QUESTIONS", value, |v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|e| e.to_string())
                    .and_then(|n| if n == 0 { Err("must be at least 1".to_string()) } else { Ok(n) })
            })?,
            None => DEFAULT_MAX_QUESTIONS,
        };
        let port = match var("PORT") {
            Some(value) => parse_with("PORT", value, |v| {
                v.trim().parse::<u16>().map_err(|e| e.to_string())
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            openrouter_api_key,
            model: var("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            output_language: var("OUTPUT_LANGUAGE"),
            ocr,
            segment_mode,
            question_filter,
            max_questions,
            syllabus_path: var("SYLLABUS_PATH").map(PathBuf::from),
            answers_dir: var("ANSWERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("exam-solver-uploads")),
            port,
        })
    }
}

fn parse_with<T, E: ToString>(
    name: &'static str,
    value: String,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    parse(&value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(
            settings(&[]),
            Err(ConfigError::Missing("OPENROUTER_API_KEY"))
        ));
        assert!(matches!(
            settings(&[("OPENROUTER_API_KEY", "  ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn defaults() {
        let s = settings(&[("OPENROUTER_API_KEY", "k")]).unwrap();
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.max_questions, DEFAULT_MAX_QUESTIONS);
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.segment_mode, SegmentMode::Numeric);
        assert_eq!(s.question_filter, QuestionFilter::None);
        assert_eq!(s.ocr.backend, OcrBackend::Tesseract);
        assert_eq!(s.ocr.languages, "eng+tam");
        assert_eq!(s.ocr.tesseract_cmd, PathBuf::from("tesseract"));
        assert!(s.ocr.tessdata_prefix.is_none());
        assert!(s.output_language.is_none());
        assert_eq!(s.answers_dir, PathBuf::from("."));
    }

    #[test]
    fn dev_environment_rewires_tesseract() {
        let s = settings(&[("OPENROUTER_API_KEY", "k"), ("ENVIRONMENT", "dev")]).unwrap();
        assert_eq!(s.ocr.tesseract_cmd, PathBuf::from(DEV_TESSERACT_CMD));
        assert!(s.ocr.tessdata_prefix.unwrap().ends_with("tessdata"));
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("OPENROUTER_API_KEY", "k"),
            ("OUTPUT_LANGUAGE", "ta"),
            ("SEGMENT_MODE", "section"),
            ("QUESTION_FILTER", "llm"),
            ("MAX_QUESTIONS", "3"),
            ("OCR_BACKEND", "llm-vision"),
            ("PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(s.output_language.as_deref(), Some("ta"));
        assert_eq!(s.segment_mode, SegmentMode::Section);
        assert_eq!(s.question_filter, QuestionFilter::Llm);
        assert_eq!(s.max_questions, 3);
        assert_eq!(s.ocr.backend, OcrBackend::LlmVision);
        assert_eq!(s.port, 8080);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = settings(&[("OPENROUTER_API_KEY", "k"), ("MAX_QUESTIONS", "0")]).unwrap_err();
        assert!(err.to_string().contains("MAX_QUESTIONS"));

        let err = settings(&[("OPENROUTER_API_KEY", "k"), ("SEGMENT_MODE", "lines")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SEGMENT_MODE", .. }));
    }

    #[test]
    fn ocr_settings_load_without_api_key() {
        let ocr = ocr_from_lookup(|name| match name {
            "OCR_LANGUAGES" => Some("eng+sin".to_string()),
            "ENVIRONMENT" => Some("dev".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(ocr.languages, "eng+sin");
        assert_eq!(ocr.tesseract_cmd, PathBuf::from(DEV_TESSERACT_CMD));

        let err = ocr_from_lookup(|name| (name == "OCR_BACKEND").then(|| "paint".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OCR_BACKEND", .. }));
    }
}
