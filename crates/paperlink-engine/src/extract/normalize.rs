use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use paperlink_core::{DocumentRecord, ExtractionMethod, LanguageClass};

use crate::error::{EngineError, Result};
use crate::extract::payload::{RawList, RawMetadata};
use crate::fingerprint::collapse_whitespace;
use crate::identifiers::Doi;

static SOFT_AUTHOR_DELIMITERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:,|，|、|&|\band\b)\s*").unwrap());

static KEYWORD_DELIMITERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[;；,，、]\s*").unwrap());

static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").unwrap());

/// Answers a model gives for a field it could not find.
const PLACEHOLDERS: &[&str] = &[
    "无", "暂无", "未知", "不详", "未提供", "暂无doi", "无doi", "n/a", "na", "none", "null",
    "unknown", "notavailable", "notprovided", "-", "—", "/",
];

/// Confidence lost for each field that was present but unusable.
const DEGRADED_FIELD_PENALTY: f64 = 0.1;

/// Who the record belongs to; everything the payload cannot supply.
#[derive(Debug, Clone)]
pub struct RecordIdentity {
    pub sequence_id: u32,
    pub original_filename: String,
    pub language: Option<LanguageClass>,
}

/// Turns loosely-typed metadata into a validated [`DocumentRecord`].
#[derive(Debug, Clone)]
pub struct MetadataNormalizer {
    min_year: i32,
    max_year: i32,
}

impl Default for MetadataNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataNormalizer {
    /// Accepts years from 1900 through next year.
    pub fn new() -> Self {
        Self::with_year_range(1900, Utc::now().year() + 1)
    }

    pub fn with_year_range(min_year: i32, max_year: i32) -> Self {
        Self { min_year, max_year }
    }

    /// Fails only when no title survives or the language class cannot be
    /// determined. Any other bad field is dropped and costs confidence.
    pub fn normalize(
        &self,
        raw: &RawMetadata,
        method: ExtractionMethod,
        identity: &RecordIdentity,
    ) -> Result<DocumentRecord> {
        let title = present(raw.title.as_deref())
            .map(clean_title)
            .unwrap_or_default();
        if title.is_empty() {
            return Err(EngineError::MalformedPayload(format!(
                "no title for {}",
                identity.original_filename
            )));
        }
        let language = identity
            .language
            .or_else(|| LanguageClass::infer_from_text(&title))
            .ok_or_else(|| {
                EngineError::MalformedPayload(format!(
                    "cannot determine language class of {}",
                    identity.original_filename
                ))
            })?;

        let mut degraded: Vec<&'static str> = Vec::new();
        let mut record = DocumentRecord::new(
            identity.sequence_id,
            language,
            identity.original_filename.clone(),
            title,
        );
        record.extraction_method = method;

        record.title_en = present(raw.title_en.as_deref())
            .map(clean_title)
            .filter(|t| !t.is_empty() && *t != record.title);

        if let Some(authors) = raw.authors.as_ref().filter(|a| !is_absent_list(a)) {
            record.authors = split_authors(authors);
            if record.authors.is_empty() {
                degraded.push("authors");
            }
        }

        record.journal = present(raw.journal.as_deref())
            .map(|j| collapse_whitespace(j.trim_matches(['《', '》'])))
            .filter(|j| !j.is_empty() && !is_placeholder(j));

        if let Some(year) = present(raw.year.as_deref()) {
            record.year = self.parse_year(year);
            if record.year.is_none() {
                degraded.push("year");
            }
        }

        if let Some(doi) = present(raw.doi.as_deref()) {
            match Doi::parse(doi) {
                Ok(doi) => record.doi = Some(doi.normalized),
                Err(_) => degraded.push("doi"),
            }
        }

        if let Some(keywords) = &raw.keywords {
            record.keywords = split_keywords(keywords);
        }

        record.extraction_confidence = match raw.confidence.filter(|c| c.is_finite()) {
            Some(supplied) => {
                let scaled = if supplied > 1.0 { supplied / 100.0 } else { supplied };
                (scaled.clamp(0.0, 1.0) - DEGRADED_FIELD_PENALTY * degraded.len() as f64)
                    .clamp(0.0, 1.0)
            }
            None => completeness(&record),
        };

        if !degraded.is_empty() {
            debug!(
                sequence_id = record.sequence_id,
                fields = ?degraded,
                "dropped malformed fields"
            );
        }
        Ok(record)
    }

    fn parse_year(&self, raw: &str) -> Option<i32> {
        let digits = FOUR_DIGITS.captures(raw.trim())?.get(1)?.as_str();
        let year: i32 = digits.parse().ok()?;
        (self.min_year..=self.max_year).contains(&year).then_some(year)
    }
}

/// Blank or placeholder text counts as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !is_placeholder(v))
}

fn is_placeholder(value: &str) -> bool {
    let folded: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '。' | '"' | '\'' | '(' | ')' | '（' | '）'))
        .flat_map(char::to_lowercase)
        .collect();
    folded.is_empty() || PLACEHOLDERS.contains(&folded.as_str())
}

fn is_absent_list(raw: &RawList) -> bool {
    match raw {
        RawList::Items(items) => items.iter().all(|i| is_placeholder(i)),
        RawList::Joined(joined) => is_placeholder(joined),
    }
}

/// Fraction of title, authors, journal, year and DOI that are filled.
pub fn completeness(record: &DocumentRecord) -> f64 {
    let filled = [
        !record.title.is_empty(),
        !record.authors.is_empty(),
        record.journal.is_some(),
        record.year.is_some(),
        record.doi.is_some(),
    ]
    .iter()
    .filter(|f| **f)
    .count();
    filled as f64 / 5.0
}

fn clean_title(raw: &str) -> String {
    collapse_whitespace(raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '“' | '”' | '「' | '」')))
}

/// Split an author list, keeping printed order.
///
/// Semicolons win when present so `Surname, Given` entries survive intact.
pub fn split_authors(raw: &RawList) -> Vec<String> {
    let parts: Vec<String> = match raw {
        RawList::Items(items) => items.clone(),
        RawList::Joined(joined) if joined.contains([';', '；']) => {
            joined.split([';', '；']).map(str::to_string).collect()
        }
        RawList::Joined(joined) => SOFT_AUTHOR_DELIMITERS
            .split(joined)
            .map(str::to_string)
            .collect(),
    };

    let mut seen = std::collections::HashSet::new();
    parts
        .iter()
        .map(|p| clean_author(p))
        .filter(|name| !is_placeholder(name))
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Drop affiliation markers (digits, asterisks, daggers) around a name.
fn clean_author(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_ascii_digit() && !matches!(c, '*' | '†' | '‡' | '#' | '¹' | '²' | '³'))
        .collect();
    collapse_whitespace(&stripped)
        .trim_matches(|c: char| matches!(c, ',' | '，' | ';' | '；'))
        .trim()
        .to_string()
}

fn split_keywords(raw: &RawList) -> Vec<String> {
    let parts: Vec<String> = match raw {
        RawList::Items(items) => items.clone(),
        RawList::Joined(joined) => KEYWORD_DELIMITERS.split(joined).map(str::to_string).collect(),
    };
    let mut seen = std::collections::HashSet::new();
    parts
        .iter()
        .map(|k| collapse_whitespace(k))
        .filter(|k| !is_placeholder(k))
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::payload::parse_model_reply;

    fn identity(language: Option<LanguageClass>) -> RecordIdentity {
        RecordIdentity {
            sequence_id: 7,
            original_filename: "paper.pdf".to_string(),
            language,
        }
    }

    fn normalizer() -> MetadataNormalizer {
        MetadataNormalizer::with_year_range(1900, 2026)
    }

    #[test]
    fn well_formed_payload_keeps_supplied_confidence() {
        let raw = RawMetadata {
            title: Some("  基于深度学习的\n 图像分类方法 ".into()),
            title_en: Some("A Deep-Learning Method for Image Classification".into()),
            authors: Some(RawList::Joined("张三1*; 李四2; 张三".into())),
            journal: Some("《计算机学报》".into()),
            year: Some("2021年".into()),
            doi: Some("DOI: 10.11897/SP.J.1016.2021.00001".into()),
            keywords: Some(RawList::Joined("深度学习；图像分类".into())),
            abstract_text: None,
            confidence: Some(85.0),
        };
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Llm, &identity(Some(LanguageClass::Zh)))
            .unwrap();
        assert_eq!(record.title, "基于深度学习的 图像分类方法");
        assert_eq!(record.authors, vec!["张三", "李四"]);
        assert_eq!(record.journal.as_deref(), Some("计算机学报"));
        assert_eq!(record.year, Some(2021));
        assert_eq!(record.doi.as_deref(), Some("10.11897/sp.j.1016.2021.00001"));
        assert_eq!(record.keywords, vec!["深度学习", "图像分类"]);
        assert_eq!(record.canonical_filename, "c07.pdf");
        assert!((record.extraction_confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn malformed_fields_degrade_instead_of_failing() {
        let raw = RawMetadata {
            title: Some("Deep Learning for Images".into()),
            year: Some("1850".into()),
            doi: Some("not a doi".into()),
            confidence: Some(0.9),
            ..RawMetadata::default()
        };
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Llm, &identity(None))
            .unwrap();
        assert_eq!(record.language_class, LanguageClass::En);
        assert_eq!(record.year, None);
        assert_eq!(record.doi, None);
        assert!((record.extraction_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn confidence_falls_back_to_completeness() {
        let raw = RawMetadata {
            title: Some("Graph Neural Networks".into()),
            authors: Some(RawList::Joined("Alice Smith, Bob Jones and Carol White".into())),
            year: Some("2020".into()),
            ..RawMetadata::default()
        };
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Heuristic, &identity(Some(LanguageClass::En)))
            .unwrap();
        assert_eq!(record.authors, vec!["Alice Smith", "Bob Jones", "Carol White"]);
        assert!((record.extraction_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn semicolons_keep_surname_given_forms() {
        let authors = split_authors(&RawList::Joined("Smith, John; Doe, Jane".into()));
        assert_eq!(authors, vec!["Smith, John", "Doe, Jane"]);
        let authors = split_authors(&RawList::Joined("王五、赵六，孙七".into()));
        assert_eq!(authors, vec!["王五", "赵六", "孙七"]);
    }

    #[test]
    fn missing_title_or_language_fails_the_record() {
        let empty = RawMetadata {
            title: Some("   ".into()),
            ..RawMetadata::default()
        };
        assert!(matches!(
            normalizer().normalize(&empty, ExtractionMethod::Llm, &identity(Some(LanguageClass::En))),
            Err(EngineError::MalformedPayload(_))
        ));

        let digits_only = RawMetadata {
            title: Some("2021 - 03".into()),
            ..RawMetadata::default()
        };
        assert!(normalizer()
            .normalize(&digits_only, ExtractionMethod::Llm, &identity(None))
            .is_err());
    }

    #[test]
    fn placeholder_answers_count_as_absent() {
        let reply = r#"{
            "title": "基于图神经网络的推荐方法",
            "title_en": "N/A",
            "authors": "无",
            "journal": "未知",
            "year": "未知",
            "doi": "暂无DOI",
            "keywords": ["无"],
            "confidence": 80
        }"#;
        let raw = parse_model_reply(reply).unwrap();
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Llm, &identity(None))
            .unwrap();
        assert_eq!(record.language_class, LanguageClass::Zh);
        assert_eq!(record.title_en, None);
        assert!(record.authors.is_empty());
        assert_eq!(record.journal, None);
        assert_eq!(record.year, None);
        assert_eq!(record.doi, None);
        assert!(record.keywords.is_empty());
        assert!((record.extraction_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn garbled_non_ascii_fields_are_dropped() {
        let reply = r#"{
            "title": "Graph Networks",
            "authors": ["12", "*†"],
            "year": "二〇二一年",
            "doi": "10.中文/abc",
            "confidence": 0.9
        }"#;
        let raw = parse_model_reply(reply).unwrap();
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Llm, &identity(None))
            .unwrap();
        assert!(record.authors.is_empty());
        assert_eq!(record.year, None);
        assert_eq!(record.doi, None);
        assert!((record.extraction_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn chinese_placeholder_doi_does_not_panic() {
        for doi in ["未提供", "无", "DOI：暂无", "https://doi.org/未知"] {
            let raw = RawMetadata {
                title: Some("Graph Networks".into()),
                doi: Some(doi.into()),
                ..RawMetadata::default()
            };
            let record = normalizer()
                .normalize(&raw, ExtractionMethod::Llm, &identity(None))
                .unwrap();
            assert_eq!(record.doi, None, "{doi}");
        }
    }

    #[test]
    fn placeholder_title_fails_the_record() {
        let raw = RawMetadata {
            title: Some("未知".into()),
            ..RawMetadata::default()
        };
        assert!(matches!(
            normalizer().normalize(&raw, ExtractionMethod::Llm, &identity(Some(LanguageClass::Zh))),
            Err(EngineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn supplied_confidence_is_clamped() {
        let raw = RawMetadata {
            title: Some("T".into()),
            confidence: Some(250.0),
            ..RawMetadata::default()
        };
        let record = normalizer()
            .normalize(&raw, ExtractionMethod::Llm, &identity(Some(LanguageClass::En)))
            .unwrap();
        assert_eq!(record.extraction_confidence, 1.0);
    }
}
