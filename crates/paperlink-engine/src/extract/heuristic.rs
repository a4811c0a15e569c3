use once_cell::sync::Lazy;
use regex::Regex;

use paperlink_core::naming::title_from_filename;

use crate::extract::payload::{RawList, RawMetadata};
use crate::identifiers::find_doi;

static JOURNAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:international|american|european|asian|chinese) journal of[^,\n]+",
        r"(?i)\b(?:journal of|proceedings of|transactions on)[^,\n]+",
        r"\b(?:IEEE|ACM|Nature|Science|Cell)\b[^,\n]*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CHINESE_JOURNAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"《([^》]{2,40})》").unwrap());

static KEYWORDS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:key\s*words|关键词|关键字)\s*[：:]\s*([^\n]+)").unwrap());

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})(?:[^0-9]|$)").unwrap());

static HEADER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:doi\b|issn\b|isbn\b|vol(?:ume)?\b|no\.|received\b|accepted\b|published\b|copyright\b|©|arxiv:|www\.)",
    )
    .unwrap()
});

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bdoi\s*[:：]|doi\.org/|https?://|\b10\.\d{4,9}/|@)").unwrap()
});

static VENUE_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:international|american|european|asian|chinese)\s+)?(?:journal of|proceedings of|(?:ieee|acm)\s+transactions)\b",
    )
    .unwrap()
});

static VENUE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:journal|proceedings|transactions)\b").unwrap());

static ISSUE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b(?:vol\.?|volume|no\.|pp\.)\s*\d|\d+\s*\(\d+\)|,\s*(?:19|20)\d{2}\b)").unwrap()
});

static CHINESE_ISSUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:第\s*[0-9一二三四五六七八九十]+\s*[卷期]|学报\s*(?:$|[（(，,0-9])|^《)").unwrap()
});

/// Title lines must be longer than this many characters.
const MIN_TITLE_CHARS: usize = 10;
const TITLE_SCAN_LINES: usize = 10;

/// Document-level metadata stored in the PDF itself (the Info dictionary).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Pattern-based extraction from the first two pages. Always produces a title.
#[derive(Debug, Clone, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn extract(&self, pages: &[String], info: &EmbeddedInfo, original_filename: &str) -> RawMetadata {
        let text = pages
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| plausible_info_title(t))
            .map(str::to_string)
            .or_else(|| pages.first().and_then(|p| title_from_first_page(p)))
            .unwrap_or_else(|| title_from_filename(original_filename));

        RawMetadata {
            title: Some(title),
            title_en: None,
            authors: info
                .author
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| RawList::Joined(a.to_string())),
            journal: find_journal(&text),
            year: YEAR.captures(&text).map(|c| c[1].to_string()),
            doi: find_doi(&text).map(|d| d.normalized),
            keywords: KEYWORDS_LINE
                .captures(&text)
                .map(|c| RawList::Joined(c[1].trim().to_string())),
            abstract_text: None,
            confidence: None,
        }
    }
}

fn title_from_first_page(page: &str) -> Option<String> {
    page.lines()
        .take(TITLE_SCAN_LINES)
        .map(str::trim)
        .find(|line| {
            line.chars().count() > MIN_TITLE_CHARS
                && !line.starts_with(|c: char| c.is_ascii_digit())
                && !looks_like_header(line)
        })
        .map(str::to_string)
}

/// Running heads and identifier lines that precede the real title: a
/// leading label, an identifier, or a venue name with its issue.
fn looks_like_header(line: &str) -> bool {
    HEADER_LABEL.is_match(line)
        || IDENTIFIER.is_match(line)
        || VENUE_HEAD.is_match(line)
        || (VENUE_WORD.is_match(line) && ISSUE_MARKER.is_match(line))
        || CHINESE_ISSUE.is_match(line)
}

/// Producer tools often write the source filename or nothing useful here.
fn plausible_info_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    title.chars().count() > MIN_TITLE_CHARS
        && !lower.ends_with(".pdf")
        && !lower.ends_with(".doc")
        && !lower.ends_with(".docx")
        && !lower.starts_with("microsoft word")
        && lower != "untitled"
}

fn find_journal(text: &str) -> Option<String> {
    for pattern in JOURNAL_PATTERNS.iter() {
        if let Some(m) = pattern.find(text) {
            let journal = m.as_str().trim();
            if !journal.is_empty() {
                return Some(journal.to_string());
            }
        }
    }
    CHINESE_JOURNAL.captures(text).map(|c| c[1].trim().to_string())
}
