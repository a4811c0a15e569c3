use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::RequestKind;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failed { reason: String },
    QuotaDenied { reason: String },
}

/// One model call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: RequestKind,
    pub fingerprint: String,
    pub model: String,
    pub prompt_chars: usize,
    pub attempts: u32,
    pub latency_ms: u64,
    pub tokens: u64,
    pub cost: f64,
    pub outcome: AuditOutcome,
}

pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Emits each entry as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: &AuditEntry) {
        match &entry.outcome {
            AuditOutcome::Success => info!(
                target: "paperlink::audit",
                kind = entry.kind.as_str(),
                fingerprint = %entry.fingerprint,
                attempts = entry.attempts,
                latency_ms = entry.latency_ms,
                tokens = entry.tokens,
                cost = entry.cost,
                "model call succeeded"
            ),
            AuditOutcome::Failed { reason } => warn!(
                target: "paperlink::audit",
                kind = entry.kind.as_str(),
                fingerprint = %entry.fingerprint,
                attempts = entry.attempts,
                latency_ms = entry.latency_ms,
                %reason,
                "model call failed"
            ),
            AuditOutcome::QuotaDenied { reason } => warn!(
                target: "paperlink::audit",
                kind = entry.kind.as_str(),
                fingerprint = %entry.fingerprint,
                %reason,
                "model call denied by budget"
            ),
        }
    }
}

/// Appends one JSON object per line.
pub struct JsonlAuditLog {
    file: Mutex<File>,
}

impl JsonlAuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Configuration(format!("{}: {e}", parent.display())))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EngineError::Configuration(format!("{}: {e}", path.display())))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditLog for JsonlAuditLog {
    fn record(&self, entry: &AuditEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "audit entry not serializable");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "failed to append audit entry");
        }
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: &AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
    }
}

/// Fans one entry out to several logs.
pub struct AuditFanout {
    sinks: Vec<Box<dyn AuditLog>>,
}

impl AuditFanout {
    pub fn new(sinks: Vec<Box<dyn AuditLog>>) -> Self {
        Self { sinks }
    }
}

impl AuditLog for AuditFanout {
    fn record(&self, entry: &AuditEntry) {
        for sink in &self.sinks {
            sink.record(entry);
        }
    }
}
