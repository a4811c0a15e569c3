//! Cross-lingual pairing of zh and en records.

pub mod assignment;
pub mod authors;
pub mod matcher;
pub mod title;

pub use assignment::{greedy_assignment, max_weight_assignment};
pub use authors::{PersonName, author_overlap, name_similarity};
pub use matcher::{CrossLingualMatcher, MatchReport, MatchSettings, TranslationFailure};
pub use title::{TitleKey, normalize_title, title_similarity};
