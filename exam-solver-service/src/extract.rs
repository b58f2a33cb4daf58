//! PDF text extraction: native text layer first, OCR over rendered pages when that is empty.
//!
//! Callers get a plain `String` back. Failures are turned into a sentinel that
//! starts with [`FAILURE_MARKER`], so anything downstream can check for them
//! with [`is_failure_sentinel`].

use anyhow::anyhow;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use serde_json::json;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::openrouter::OpenRouterClient;

pub const FAILURE_MARKER: &str = "⚠️";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF file not found: {0}")]
    NotFound(String),

    #[error("native extraction failed: {0}")]
    Native(String),

    #[error("failed to render PDF pages: {0}")]
    Render(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("no text could be extracted from the document")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn failure_sentinel(error: &ExtractError) -> String {
    format!("{FAILURE_MARKER} Could not extract text from the PDF: {error}")
}

pub fn is_failure_sentinel(text: &str) -> bool {
    text.contains(FAILURE_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrBackend {
    /// Local tesseract binary
    #[default]
    Tesseract,
    /// Page images sent to a vision model
    LlmVision,
}

impl FromStr for OcrBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "llm-vision" | "llm_vision" | "vision" => Ok(Self::LlmVision),
            other => Err(format!("unknown OCR backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub backend: OcrBackend,
    /// Value passed to `tesseract -l`
    pub languages: String,
    pub tesseract_cmd: PathBuf,
    /// Exported as `TESSDATA_PREFIX` for the tesseract process when set
    pub tessdata_prefix: Option<PathBuf>,
    pub vision_model: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Tesseract,
            languages: "eng+tam".to_string(),
            tesseract_cmd: PathBuf::from("tesseract"),
            tessdata_prefix: None,
            vision_model: "openai/gpt-4.1-mini".to_string(),
        }
    }
}

pub struct TextExtractor {
    ocr: OcrSettings,
    /// Needed only by the vision backend
    vision_client: Option<OpenRouterClient>,
}

impl TextExtractor {
    pub fn new(ocr: OcrSettings, vision_client: Option<OpenRouterClient>) -> Self {
        Self { ocr, vision_client }
    }

    /// Extracted text, or a failure sentinel
    pub async fn extract(&self, path: &Path) -> String {
        match self.try_extract(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "PDF extraction failed");
                failure_sentinel(&e)
            }
        }
    }

    pub async fn try_extract(&self, path: &Path) -> Result<String, ExtractError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(ExtractError::NotFound(path.display().to_string()));
        }

        match extract_native(path).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "native PDF text extracted");
                return Ok(text);
            }
            Ok(_) => info!("PDF has no text layer, falling back to OCR"),
            Err(e) => warn!(error = %e, "native extraction failed, falling back to OCR"),
        }

        let text = self.extract_with_ocr(path).await?;
        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        info!(chars = text.len(), backend = ?self.ocr.backend, "OCR text extracted");
        Ok(text)
    }

    async fn extract_with_ocr(&self, path: &Path) -> Result<String, ExtractError> {
        let pages = render_pages(path).await?;
        if pages.is_empty() {
            return Err(ExtractError::Render("no pages rendered".to_string()));
        }
        info!(pages = pages.len(), "rendered PDF pages for OCR");

        match self.ocr.backend {
            OcrBackend::Tesseract => {
                let mut text = String::new();
                for (i, page) in pages.into_iter().enumerate() {
                    let page_text = tesseract_page(&self.ocr, page).await?;
                    info!(page = i + 1, chars = page_text.len(), "OCR page done");
                    text.push_str(&page_text);
                    text.push_str("\n\n");
                }
                Ok(text)
            }
            OcrBackend::LlmVision => {
                let client = self.vision_client.as_ref().ok_or_else(|| {
                    ExtractError::Ocr("vision OCR needs an OpenRouter client".to_string())
                })?;
                vision_ocr(client, &self.ocr.vision_model, &pages)
                    .await
                    .map_err(|e| ExtractError::Ocr(e.to_string()))
            }
        }
    }
}

async fn extract_native(path: &Path) -> Result<String, ExtractError> {
    let owned = path.to_path_buf();
    // pdf-extract can panic on malformed files; the join error catches that
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| ExtractError::Native(e.to_string()))?
        .map_err(|e| ExtractError::Native(e.to_string()))
}

async fn render_pages(path: &Path) -> Result<Vec<DynamicImage>, ExtractError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<DynamicImage>, ExtractError> {
        let pdf = PDF::from_file(&owned).map_err(|e| ExtractError::Render(e.to_string()))?;
        pdf.render(Pages::All, None)
            .map_err(|e| ExtractError::Render(e.to_string()))
    })
    .await
    .map_err(|e| ExtractError::Render(e.to_string()))?
}

/// Page image as a temporary PNG, encoded and written on the blocking pool
async fn write_page_png(page: DynamicImage) -> Result<NamedTempFile, ExtractError> {
    tokio::task::spawn_blocking(move || -> Result<NamedTempFile, ExtractError> {
        let image_file = tempfile::Builder::new()
            .prefix("exam-page-")
            .suffix(".png")
            .tempfile()?;
        page.save_with_format(image_file.path(), ImageFormat::Png)
            .map_err(|e| ExtractError::Ocr(format!("failed to write page image: {e}")))?;
        Ok(image_file)
    })
    .await
    .map_err(|e| ExtractError::Ocr(e.to_string()))?
}

async fn tesseract_page(ocr: &OcrSettings, page: DynamicImage) -> Result<String, ExtractError> {
    let image_file = write_page_png(page).await?;

    let mut command = Command::new(&ocr.tesseract_cmd);
    command
        .arg(image_file.path())
        .arg("stdout")
        .arg("-l")
        .arg(&ocr.languages);
    if let Some(prefix) = &ocr.tessdata_prefix {
        command.env("TESSDATA_PREFIX", prefix);
    }

    let output = command.output().await.map_err(|e| {
        ExtractError::Ocr(format!(
            "could not run {}: {e}",
            ocr.tesseract_cmd.display()
        ))
    })?;

    if !output.status.success() {
        return Err(ExtractError::Ocr(format!(
            "tesseract exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// All pages in one vision call, each transcribed under a `=== Page N ===` header
async fn vision_ocr(
    client: &OpenRouterClient,
    model: &str,
    pages: &[DynamicImage],
) -> anyhow::Result<String> {
    let mut content = vec![json!({
        "type": "text",
        "text": format!(
            "You are an OCR system for exam papers. I'm providing you with {} pages written in English, Tamil or Sinhala. \
            Extract ALL text from these pages exactly, preserving question numbers, mathematical notation and layout.

            For each page, start with '=== Page X ===' as a header, then provide the extracted text.

            Return ONLY the extracted text without any commentary or explanations.",
            pages.len()
        )
    })];

    for page in pages {
        content.push(json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/png;base64,{}", image_to_base64(page)?)
            }
        }));
    }

    client.complete(model, content, 4000).await
}

fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(STANDARD.encode(&buffer))
}
