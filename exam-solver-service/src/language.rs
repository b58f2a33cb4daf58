//! Output-language resolution for an uploaded exam.
//!
//! Detection counts characters per script, prefers a script that clearly
//! dominates, and otherwise asks a statistical identifier. A configured
//! override short-circuits everything.

use lingua::{Language, LanguageDetectorBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Minimum number of characters a script needs before it can win outright.
pub const SCRIPT_THRESHOLD: usize = 50;
/// How far ahead of the other secondary script the winning script must be.
pub const SCRIPT_MARGIN: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageCode {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "si")]
    Sinhala,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 3] = [Self::English, Self::Tamil, Self::Sinhala];

    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Tamil => "ta",
            Self::Sinhala => "si",
        }
    }

    /// Name used inside prompts and shown to the user
    pub fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Tamil => "Tamil",
            Self::Sinhala => "Sinhala",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    /// Map an identifier's language tag ("en", "ta-LK", "tam"...) onto a supported code
    pub fn from_prefix(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| tag.starts_with(lang.code()))
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported language '{0}', expected one of: auto, en, ta, si")]
pub struct UnknownLanguage(pub String);

impl FromStr for LanguageCode {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// What the user picked in the language selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageChoice {
    #[default]
    Auto,
    Fixed(LanguageCode),
}

impl FromStr for LanguageChoice {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        trimmed.parse().map(Self::Fixed)
    }
}

/// Per-script character counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptCounts {
    pub latin: usize,
    pub tamil: usize,
    pub sinhala: usize,
}

impl ScriptCounts {
    pub fn of(text: &str) -> Self {
        text.chars().fold(Self::default(), |mut counts, c| {
            match c {
                'A'..='Z' | 'a'..='z' => counts.latin += 1,
                '\u{0B80}'..='\u{0BFF}' => counts.tamil += 1,
                '\u{0D80}'..='\u{0DFF}' => counts.sinhala += 1,
                _ => {}
            }
            counts
        })
    }

    fn is_empty(&self) -> bool {
        self.latin == 0 && self.tamil == 0 && self.sinhala == 0
    }

    /// The secondary script that clearly dominates, if any
    pub fn dominant_script(&self) -> Option<LanguageCode> {
        if dominates(self.tamil, self.sinhala) {
            Some(LanguageCode::Tamil)
        } else if dominates(self.sinhala, self.tamil) {
            Some(LanguageCode::Sinhala)
        } else {
            None
        }
    }
}

fn dominates(count: usize, other: usize) -> bool {
    count > SCRIPT_THRESHOLD && count as f64 > other as f64 * SCRIPT_MARGIN
}

/// Best-effort statistical language identification returning a language tag
pub trait LanguageIdentifier: Send + Sync {
    fn identify(&self, text: &str) -> Option<String>;
}

/// [`LanguageIdentifier`] backed by lingua, limited to the languages it can tell apart here
pub struct LinguaIdentifier {
    detector: lingua::LanguageDetector,
}

impl LinguaIdentifier {
    pub fn new() -> Self {
        let detector =
            LanguageDetectorBuilder::from_languages(&[Language::English, Language::Tamil]).build();
        Self { detector }
    }
}

impl Default for LinguaIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageIdentifier for LinguaIdentifier {
    fn identify(&self, text: &str) -> Option<String> {
        self.detector
            .detect_language_of(text)
            .map(|language| language.iso_code_639_1().to_string())
    }
}

pub struct LanguageDetector {
    override_code: Option<LanguageCode>,
    identifier: Box<dyn LanguageIdentifier>,
}

impl LanguageDetector {
    /// `override_code` is the raw configured value; unsupported values are ignored.
    pub fn new(override_code: Option<&str>, identifier: Box<dyn LanguageIdentifier>) -> Self {
        let override_code = override_code.and_then(|raw| {
            let parsed = LanguageCode::from_code(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                warn!(value = %raw, "ignoring unsupported OUTPUT_LANGUAGE override");
            }
            parsed
        });
        Self {
            override_code,
            identifier,
        }
    }

    pub fn with_lingua(override_code: Option<&str>) -> Self {
        Self::new(override_code, Box::new(LinguaIdentifier::new()))
    }

    pub fn override_code(&self) -> Option<LanguageCode> {
        self.override_code
    }

    pub fn detect(&self, text: &str) -> LanguageCode {
        if let Some(code) = self.override_code {
            debug!(code = %code, "language forced by override");
            return code;
        }

        let counts = ScriptCounts::of(text);
        debug!(?counts, "script counts");

        if let Some(code) = counts.dominant_script() {
            return code;
        }

        if counts.is_empty() {
            return LanguageCode::default();
        }

        self.identifier
            .identify(text)
            .and_then(|tag| LanguageCode::from_prefix(&tag))
            .unwrap_or_default()
    }

    /// Apply the user's selection, detecting only when asked to
    pub fn resolve(&self, choice: LanguageChoice, text: &str) -> LanguageCode {
        match choice {
            LanguageChoice::Auto => self.detect(text),
            LanguageChoice::Fixed(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIdentifier(Option<&'static str>);

    impl LanguageIdentifier for FixedIdentifier {
        fn identify(&self, _text: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn detector(override_code: Option<&str>, tag: Option<&'static str>) -> LanguageDetector {
        LanguageDetector::new(override_code, Box::new(FixedIdentifier(tag)))
    }

    fn tamil_text(chars: usize) -> String {
        "அ".repeat(chars)
    }

    fn sinhala_text(chars: usize) -> String {
        "ක".repeat(chars)
    }

    #[test]
    fn latin_only_text_is_english() {
        let text = "Find the value of x when two times x equals ten. ".repeat(4);
        assert_eq!(detector(None, Some("en")).detect(&text), LanguageCode::English);
        // Even if the identifier has no opinion
        assert_eq!(detector(None, None).detect(&text), LanguageCode::English);
    }

    #[test]
    fn secondary_script_above_threshold_wins() {
        assert_eq!(
            detector(None, Some("en")).detect(&tamil_text(60)),
            LanguageCode::Tamil
        );
        assert_eq!(
            detector(None, Some("en")).detect(&sinhala_text(60)),
            LanguageCode::Sinhala
        );
    }

    #[test]
    fn override_beats_content() {
        let det = detector(Some("si"), Some("ta"));
        assert_eq!(det.detect(&tamil_text(500)), LanguageCode::Sinhala);
        assert_eq!(det.detect(""), LanguageCode::Sinhala);
    }

    #[test]
    fn unsupported_override_is_ignored() {
        let det = detector(Some("fr"), None);
        assert_eq!(det.override_code(), None);
        assert_eq!(det.detect(&tamil_text(80)), LanguageCode::Tamil);
    }

    #[test]
    fn threshold_is_exclusive() {
        // Exactly 50 Tamil characters is not enough, so the identifier decides
        assert_eq!(
            detector(None, Some("en")).detect(&tamil_text(SCRIPT_THRESHOLD)),
            LanguageCode::English
        );
        assert_eq!(
            detector(None, Some("en")).detect(&tamil_text(SCRIPT_THRESHOLD + 1)),
            LanguageCode::Tamil
        );
    }

    #[test]
    fn close_scripts_fall_back_to_identifier() {
        // 100 vs 90 is inside the 1.2 margin
        let text = format!("{}{}", tamil_text(100), sinhala_text(90));
        assert_eq!(detector(None, Some("ta-LK")).detect(&text), LanguageCode::Tamil);
        assert_eq!(detector(None, Some("xx")).detect(&text), LanguageCode::English);
    }

    #[test]
    fn empty_text_is_default() {
        assert_eq!(detector(None, Some("ta")).detect(""), LanguageCode::English);
        assert_eq!(detector(None, Some("ta")).detect("12 + 7 = ?"), LanguageCode::English);
    }

    #[test]
    fn choice_parsing_and_resolution() {
        assert_eq!("auto".parse::<LanguageChoice>().unwrap(), LanguageChoice::Auto);
        assert_eq!("".parse::<LanguageChoice>().unwrap(), LanguageChoice::Auto);
        assert_eq!(
            " TA ".parse::<LanguageChoice>().unwrap(),
            LanguageChoice::Fixed(LanguageCode::Tamil)
        );
        assert!("de".parse::<LanguageChoice>().is_err());

        let det = detector(None, None);
        assert_eq!(
            det.resolve(LanguageChoice::Fixed(LanguageCode::Sinhala), &tamil_text(100)),
            LanguageCode::Sinhala
        );
        assert_eq!(det.resolve(LanguageChoice::Auto, &tamil_text(100)), LanguageCode::Tamil);
    }

    #[test]
    fn lingua_identifies_english_sentence() {
        let identifier = LinguaIdentifier::new();
        let tag = identifier.identify("The quick brown fox jumps over the lazy dog near the river bank.");
        assert_eq!(tag.as_deref(), Some("en"));
    }
}
