//! paperlink core: records, pairings, configuration, canonical naming and storage.

pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod storage;

pub use config::{AppConfig, AssignmentStrategy, MatchingConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;
pub use storage::{RecordStore, apply_pairings, export_records};
