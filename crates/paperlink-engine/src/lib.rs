//! Paperlink engine: model gateway, metadata extraction, cross-lingual matching.

pub mod audit;
pub mod backend;
pub mod batch;
pub mod budget;
pub mod cache;
pub mod clock;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod gateway;
pub mod identifiers;
pub mod matching;
pub mod retry;
pub mod translate;

pub use batch::{BatchExtractor, BatchReport};
pub use budget::{BudgetTracker, Reservation};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use extract::{DocumentExtractor, EmbeddedInfo, SourceDocument};
pub use fingerprint::Fingerprint;
pub use gateway::{GatewayResponse, ModelGateway};
pub use matching::{CrossLingualMatcher, MatchReport, MatchSettings};
pub use translate::{TextKind, Translator};
