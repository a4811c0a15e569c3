//! Metadata extraction: model path, heuristic fallback, normalization.

pub mod client;
pub mod excerpt;
pub mod heuristic;
pub mod normalize;
pub mod payload;
pub mod prompt;

use tracing::{info, warn};

use paperlink_core::{DocumentRecord, ExtractionMethod, LanguageClass};

pub use client::{ExtractionClient, ExtractionOutcome, ExtractionSettings};
pub use excerpt::{Excerpt, bound_excerpt};
pub use heuristic::{EmbeddedInfo, HeuristicExtractor};
pub use normalize::{MetadataNormalizer, RecordIdentity};
pub use payload::{RawList, RawMetadata, parse_model_reply};

/// A document ready for extraction: its identity plus page texts.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub sequence_id: u32,
    pub original_filename: String,
    pub language: LanguageClass,
    pub pages: Vec<String>,
    pub info: EmbeddedInfo,
}

impl SourceDocument {
    fn identity(&self) -> RecordIdentity {
        RecordIdentity {
            sequence_id: self.sequence_id,
            original_filename: self.original_filename.clone(),
            language: Some(self.language),
        }
    }
}

/// Model extraction when available, heuristic extraction otherwise.
pub struct DocumentExtractor {
    client: Option<ExtractionClient>,
    heuristic: HeuristicExtractor,
    normalizer: MetadataNormalizer,
}

impl DocumentExtractor {
    pub fn new(client: Option<ExtractionClient>) -> Self {
        Self {
            client,
            heuristic: HeuristicExtractor,
            normalizer: MetadataNormalizer::new(),
        }
    }

    pub fn uses_model(&self) -> bool {
        self.client.is_some()
    }

    /// Never fails: every model-side error degrades to the heuristic path,
    /// and the heuristic path always finds a title.
    pub async fn extract_record(&self, document: &SourceDocument) -> DocumentRecord {
        if let Some(client) = &self.client {
            match self.extract_with_model(client, document).await {
                Ok(record) => return record,
                Err(e) => warn!(
                    sequence_id = document.sequence_id,
                    file = %document.original_filename,
                    error = %e,
                    "model extraction unavailable, using heuristics"
                ),
            }
        }
        self.extract_heuristic(document)
    }

    async fn extract_with_model(
        &self,
        client: &ExtractionClient,
        document: &SourceDocument,
    ) -> crate::Result<DocumentRecord> {
        let outcome = client.extract(document.sequence_id, &document.pages).await?;
        let record =
            self.normalizer
                .normalize(&outcome.metadata, ExtractionMethod::Llm, &document.identity())?;
        info!(
            sequence_id = record.sequence_id,
            cached = outcome.from_cache,
            confidence = record.extraction_confidence,
            "extracted metadata"
        );
        Ok(record)
    }

    pub fn extract_heuristic(&self, document: &SourceDocument) -> DocumentRecord {
        let raw = self
            .heuristic
            .extract(&document.pages, &document.info, &document.original_filename);
        match self
            .normalizer
            .normalize(&raw, ExtractionMethod::Heuristic, &document.identity())
        {
            Ok(record) => record,
            Err(e) => {
                warn!(sequence_id = document.sequence_id, error = %e, "heuristic metadata unusable");
                let title = paperlink_core::naming::title_from_filename(&document.original_filename);
                DocumentRecord::new(
                    document.sequence_id,
                    document.language,
                    document.original_filename.clone(),
                    title,
                )
            }
        }
    }
}
