use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("extraction failed for {fingerprint} after {attempts} attempt(s): {reason}")]
    ExtractionFailed {
        fingerprint: String,
        attempts: u32,
        reason: String,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Core(#[from] paperlink_core::CoreError),
}

impl EngineError {
    /// Errors after which the caller should fall back to heuristic extraction.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded(_)
                | Self::ExtractionFailed { .. }
                | Self::MalformedPayload(_)
                | Self::TranslationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
