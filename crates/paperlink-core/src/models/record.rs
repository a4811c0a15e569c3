use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Language class of a document: which corpus it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageClass {
    Zh,
    En,
}

impl LanguageClass {
    /// Filename prefix used for canonical names (`c01.pdf`, `e01.pdf`).
    pub fn prefix(&self) -> char {
        match self {
            Self::Zh => 'c',
            Self::En => 'e',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }

    /// Guess the class from a title: any Han character means zh, otherwise
    /// Latin letters mean en. `None` when the text carries neither.
    pub fn infer_from_text(text: &str) -> Option<Self> {
        if text.chars().any(is_han) {
            Some(Self::Zh)
        } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
            Some(Self::En)
        } else {
            None
        }
    }
}

impl fmt::Display for LanguageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "cn" | "chinese" | "中文" => Ok(Self::Zh),
            "en" | "english" | "英文" => Ok(Self::En),
            other => Err(CoreError::ValidationError(format!(
                "unknown language class: {other}"
            ))),
        }
    }
}

/// CJK Unified Ideographs (base block and extension A).
pub fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Heuristic,
    Llm,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic => f.write_str("heuristic"),
            Self::Llm => f.write_str("llm"),
        }
    }
}

/// One record per PDF in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub sequence_id: u32,
    pub canonical_filename: String,
    pub original_filename: String,
    pub language_class: LanguageClass,

    pub title: String,

    /// English title supplied alongside a zh title, when the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    pub extraction_method: ExtractionMethod,
    pub extraction_confidence: f64,

    pub added_at: DateTime<Utc>,

    /// `sequence_id` of the paired record in the other language class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_with: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_confidence: Option<f64>,
}

impl DocumentRecord {
    pub fn new(
        sequence_id: u32,
        language_class: LanguageClass,
        original_filename: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            sequence_id,
            canonical_filename: crate::naming::canonical_filename(language_class, sequence_id),
            original_filename: original_filename.into(),
            language_class,
            title: title.into(),
            title_en: None,
            authors: Vec::new(),
            journal: None,
            year: None,
            doi: None,
            keywords: Vec::new(),
            extraction_method: ExtractionMethod::Heuristic,
            extraction_confidence: 0.0,
            added_at: Utc::now(),
            paired_with: None,
            pair_confidence: None,
        }
    }

    pub fn clear_pairing(&mut self) {
        self.paired_with = None;
        self.pair_confidence = None;
    }
}
