use std::sync::Arc;

use tracing::debug;

use paperlink_core::AppConfig;

use crate::backend::{ChatMessage, CompletionRequest, RequestKind};
use crate::error::Result;
use crate::extract::excerpt::{Excerpt, bound_excerpt};
use crate::extract::payload::{RawMetadata, parse_model_reply};
use crate::extract::prompt::{EXTRACTION_SYSTEM, PROMPT_VERSION, extraction_prompt};
use crate::fingerprint::Fingerprint;
use crate::gateway::ModelGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub max_pages: usize,
    pub max_chars: usize,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ExtractionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_pages: config.extraction.max_pages,
            max_chars: config.extraction.max_chars,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub fingerprint: Fingerprint,
    pub metadata: RawMetadata,
    pub from_cache: bool,
    pub excerpt_chars: usize,
}

/// Model-backed metadata extraction for one document at a time.
pub struct ExtractionClient {
    gateway: Arc<ModelGateway>,
    settings: ExtractionSettings,
}

impl ExtractionClient {
    pub fn new(gateway: Arc<ModelGateway>, settings: ExtractionSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    pub fn excerpt(&self, pages: &[String]) -> Excerpt {
        bound_excerpt(pages, self.settings.max_pages, self.settings.max_chars)
    }

    /// Key over the truncated excerpt, so text beyond `max_chars` never
    /// affects caching.
    pub fn fingerprint(&self, excerpt: &Excerpt) -> Fingerprint {
        Fingerprint::builder("extract")
            .field("prompt", PROMPT_VERSION)
            .text("excerpt", &excerpt.text)
            .field("max_pages", self.settings.max_pages)
            .field("model", &self.settings.model)
            .field("temperature", self.settings.temperature)
            .finish()
    }

    /// Errors: `QuotaExceeded`, `ExtractionFailed`, `MalformedPayload`. All of
    /// them mean "use the heuristic path instead".
    pub async fn extract(&self, document_id: u32, pages: &[String]) -> Result<ExtractionOutcome> {
        let excerpt = self.excerpt(pages);
        let fingerprint = self.fingerprint(&excerpt);
        debug!(
            document_id,
            fingerprint = fingerprint.short(),
            chars = excerpt.char_count(),
            truncated = excerpt.truncated,
            "extracting metadata"
        );

        let request = CompletionRequest {
            kind: RequestKind::Extraction,
            messages: vec![
                ChatMessage::system(EXTRACTION_SYSTEM),
                ChatMessage::user(extraction_prompt(excerpt.pages_used.max(1), &excerpt.text)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_mode: true,
        };

        let response = self.gateway.complete(&fingerprint, &request).await?;
        let metadata = match parse_model_reply(&response.completion.content) {
            Ok(metadata) => metadata,
            Err(e) => {
                // Do not serve the same unusable reply again.
                self.gateway.cache().invalidate(&fingerprint).await;
                return Err(e);
            }
        };

        Ok(ExtractionOutcome {
            fingerprint,
            metadata,
            from_cache: response.from_cache,
            excerpt_chars: excerpt.char_count(),
        })
    }
}
