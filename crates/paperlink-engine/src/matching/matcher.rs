use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use paperlink_core::{
    AssignmentStrategy, DocumentRecord, LanguageClass, MatchPairing, MatchRationale, MatchingConfig,
    is_han,
};

use crate::matching::assignment::{greedy_assignment, max_weight_assignment};
use crate::matching::authors::author_overlap;
use crate::matching::title::TitleKey;
use crate::translate::{TextKind, Translator};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub threshold: f64,
    pub title_weight: f64,
    pub author_weight: f64,
    pub year_weight: f64,
    pub assignment: AssignmentStrategy,
    pub concurrency: usize,
}

impl From<&MatchingConfig> for MatchSettings {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            title_weight: config.title_weight,
            author_weight: config.author_weight,
            year_weight: config.year_weight,
            assignment: config.assignment,
            concurrency: config.concurrency.max(1),
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from(&MatchingConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationFailure {
    pub zh_id: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchReport {
    pub pairings: Vec<MatchPairing>,
    pub unmatched_zh: Vec<u32>,
    pub unmatched_en: Vec<u32>,
    pub translation_failures: Vec<TranslationFailure>,
    /// Pairs at or above the threshold before assignment.
    pub candidates: usize,
}

/// A zh record with its English-side view resolved.
#[derive(Debug, Clone)]
struct PreparedZh {
    id: u32,
    title_en: String,
    key: TitleKey,
    authors: Option<Vec<String>>,
    year: Option<i32>,
}

#[derive(Debug, Clone)]
struct PreparedEn {
    id: u32,
    key: TitleKey,
    authors: Vec<String>,
    year: Option<i32>,
}

/// Pairs zh records with en records by translated title, authors and year.
pub struct CrossLingualMatcher {
    translator: Arc<dyn Translator>,
    settings: MatchSettings,
    /// Translations by zh `sequence_id` and source title.
    translations: Mutex<HashMap<(u32, String), String>>,
}

impl CrossLingualMatcher {
    pub fn new(translator: Arc<dyn Translator>, settings: MatchSettings) -> Self {
        Self {
            translator,
            settings,
            translations: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Compute pairings for the two collections. Deterministic for a given
    /// input and translation results.
    pub async fn run(&self, zh: &[DocumentRecord], en: &[DocumentRecord]) -> MatchReport {
        let mut zh: Vec<&DocumentRecord> = zh
            .iter()
            .filter(|r| r.language_class == LanguageClass::Zh)
            .collect();
        let mut en: Vec<&DocumentRecord> = en
            .iter()
            .filter(|r| r.language_class == LanguageClass::En)
            .collect();
        zh.sort_by_key(|r| r.sequence_id);
        en.sort_by_key(|r| r.sequence_id);

        let prepared: Vec<Result<PreparedZh, TranslationFailure>> = stream::iter(zh.iter().copied())
            .map(|record| self.prepare_zh(record))
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = MatchReport::default();
        let mut zh_ready = Vec::new();
        for item in prepared {
            match item {
                Ok(p) => zh_ready.push(p),
                Err(failure) => {
                    warn!(zh_id = failure.zh_id, reason = %failure.reason, "translation failed, record left unmatched");
                    report.translation_failures.push(failure);
                }
            }
        }
        let en_ready: Vec<PreparedEn> = en
            .iter()
            .map(|r| PreparedEn {
                id: r.sequence_id,
                key: TitleKey::new(&r.title),
                authors: r.authors.clone(),
                year: r.year,
            })
            .collect();

        let scores: Vec<Vec<(f64, MatchRationale)>> = zh_ready
            .iter()
            .map(|z| en_ready.iter().map(|e| self.score(z, e)).collect())
            .collect();

        let is_candidate = |i: usize, j: usize| scores[i][j].0 >= self.settings.threshold;
        report.candidates = (0..zh_ready.len())
            .flat_map(|i| (0..en_ready.len()).map(move |j| (i, j)))
            .filter(|&(i, j)| is_candidate(i, j))
            .count();

        let assigned = match self.settings.assignment {
            AssignmentStrategy::Optimal => {
                let weights: Vec<Vec<f64>> = (0..zh_ready.len())
                    .map(|i| {
                        (0..en_ready.len())
                            .map(|j| if is_candidate(i, j) { scores[i][j].0 } else { 0.0 })
                            .collect()
                    })
                    .collect();
                max_weight_assignment(&weights)
            }
            AssignmentStrategy::Greedy => {
                let candidates: Vec<(usize, usize, f64)> = (0..zh_ready.len())
                    .flat_map(|i| (0..en_ready.len()).map(move |j| (i, j)))
                    .filter(|&(i, j)| is_candidate(i, j))
                    .map(|(i, j)| (i, j, scores[i][j].0))
                    .collect();
                greedy_assignment(&candidates)
            }
        };

        for (i, j) in assigned {
            if !is_candidate(i, j) {
                continue;
            }
            let (confidence, rationale) = scores[i][j].clone();
            debug!(
                zh_id = zh_ready[i].id,
                en_id = en_ready[j].id,
                confidence,
                signals = %rationale.describe(),
                "paired"
            );
            report.pairings.push(MatchPairing {
                zh_id: zh_ready[i].id,
                en_id: en_ready[j].id,
                match_confidence: confidence,
                rationale,
            });
        }
        report.pairings.sort_by_key(|p| p.zh_id);

        let paired_zh: Vec<u32> = report.pairings.iter().map(|p| p.zh_id).collect();
        let paired_en: Vec<u32> = report.pairings.iter().map(|p| p.en_id).collect();
        report.unmatched_zh = zh
            .iter()
            .map(|r| r.sequence_id)
            .filter(|id| !paired_zh.contains(id))
            .collect();
        report.unmatched_en = en
            .iter()
            .map(|r| r.sequence_id)
            .filter(|id| !paired_en.contains(id))
            .collect();

        info!(
            pairings = report.pairings.len(),
            candidates = report.candidates,
            unmatched_zh = report.unmatched_zh.len(),
            unmatched_en = report.unmatched_en.len(),
            "matching finished"
        );
        report
    }

    async fn prepare_zh(&self, record: &DocumentRecord) -> Result<PreparedZh, TranslationFailure> {
        let title_en = match record.title_en.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title_en) => title_en.to_string(),
            None => self.english_title(record).await?,
        };
        let authors = self.romanized_authors(record).await;
        Ok(PreparedZh {
            id: record.sequence_id,
            key: TitleKey::new(&title_en),
            title_en,
            authors,
            year: record.year,
        })
    }

    async fn english_title(&self, record: &DocumentRecord) -> Result<String, TranslationFailure> {
        let memo_key = (record.sequence_id, record.title.clone());
        if let Some(hit) = self.memo().get(&memo_key).cloned() {
            return Ok(hit);
        }
        if !record.title.chars().any(is_han) {
            // Already Latin script; compare as is.
            return Ok(record.title.clone());
        }
        let translated = self
            .translator
            .translate(&record.title, TextKind::Title, LanguageClass::En)
            .await
            .map_err(|e| TranslationFailure {
                zh_id: record.sequence_id,
                reason: e.to_string(),
            })?;
        self.memo().insert(memo_key, translated.clone());
        Ok(translated)
    }

    /// Han-script author lists go through the translator; `None` when that
    /// fails or there are no authors.
    async fn romanized_authors(&self, record: &DocumentRecord) -> Option<Vec<String>> {
        if record.authors.is_empty() {
            return None;
        }
        if !record.authors.iter().any(|a| a.chars().any(is_han)) {
            return Some(record.authors.clone());
        }
        let joined = record.authors.join("; ");
        match self
            .translator
            .translate(&joined, TextKind::PersonNames, LanguageClass::En)
            .await
        {
            Ok(romanized) => {
                let names: Vec<String> = romanized
                    .split([';', '；', '\n'])
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
                (!names.is_empty()).then_some(names)
            }
            Err(e) => {
                debug!(zh_id = record.sequence_id, error = %e, "author romanization failed");
                None
            }
        }
    }

    fn score(&self, zh: &PreparedZh, en: &PreparedEn) -> (f64, MatchRationale) {
        let title = zh.key.similarity(&en.key);
        let authors = zh
            .authors
            .as_deref()
            .and_then(|names| author_overlap(names, &en.authors));
        let year = match (zh.year, en.year) {
            (Some(a), Some(b)) => Some(year_agreement(a, b)),
            _ => None,
        };

        let s = &self.settings;
        let mut weighted = s.title_weight * title;
        let mut total_weight = s.title_weight;
        if let Some(a) = authors {
            weighted += s.author_weight * a;
            total_weight += s.author_weight;
        }
        if let Some(y) = year {
            weighted += s.year_weight * y;
            total_weight += s.year_weight;
        }
        let confidence = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        (
            confidence,
            MatchRationale {
                title_similarity: title,
                author_overlap: authors,
                year_agreement: year,
                translated_title: Some(zh.title_en.clone()),
            },
        )
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, HashMap<(u32, String), String>> {
        self.translations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn year_agreement(a: i32, b: i32) -> f64 {
    match (a - b).abs() {
        0 => 1.0,
        1 => 0.25,
        _ => 0.0,
    }
}
