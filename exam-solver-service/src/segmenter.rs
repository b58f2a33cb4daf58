//! Splits extracted exam text into question segments.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

/// `1.`, `2)`, `Q3:`, `04.` with an optional leading newline
static NUMERIC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?Q?\d{1,2}[.:)]").expect("numeric marker regex"));

/// `Section 1`, `SECTION2`, ...
static SECTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)section\s*\d+").expect("section marker regex"));

const MATH_SYMBOLS: &[char] = &[
    '+', '-', '*', '/', '=', '<', '>', '^', '×', '÷', '√', '%', '≤', '≥',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// Split on short numeric question markers
    #[default]
    Numeric,
    /// Drop everything before the first "section N" label, then split on each label
    Section,
}

impl FromStr for SegmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" => Ok(Self::Numeric),
            "section" => Ok(Self::Section),
            other => Err(format!("unknown segment mode '{other}'")),
        }
    }
}

/// Both views of a segmentation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    pub all: Vec<String>,
    pub valid: Vec<String>,
}

/// Split `text` into trimmed, non-empty segments in source order.
///
/// Text with no markers comes back as a single segment in either mode;
/// blank text yields nothing.
pub fn segment(text: &str, mode: SegmentMode) -> Vec<String> {
    match mode {
        SegmentMode::Numeric => split_on(&NUMERIC_MARKER, text),
        SegmentMode::Section => match SECTION_MARKER.find(text) {
            Some(first) => split_on(&SECTION_MARKER, &text[first.start()..]),
            None => split_on(&SECTION_MARKER, text),
        },
    }
}

pub fn segment_with_filter(text: &str, mode: SegmentMode) -> Segmentation {
    let all = segment(text, mode);
    let valid = all
        .iter()
        .filter(|segment| looks_mathematical(segment))
        .cloned()
        .collect();
    Segmentation { all, valid }
}

/// A digit or arithmetic/comparison symbol, and more than two tokens
pub fn looks_mathematical(segment: &str) -> bool {
    let has_math = segment
        .chars()
        .any(|c| c.is_ascii_digit() || MATH_SYMBOLS.contains(&c));
    has_math && segment.split_whitespace().count() > 2
}

fn split_on(marker: &Regex, text: &str) -> Vec<String> {
    marker
        .split(text)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
