use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{info, warn};

use paperlink_core::{DocumentRecord, ExtractionMethod};

use crate::extract::{DocumentExtractor, SourceDocument};

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Completed records, sorted by `sequence_id`.
    pub records: Vec<DocumentRecord>,
    pub cancelled: bool,
    pub llm_count: usize,
    pub heuristic_count: usize,
}

/// Extracts many documents concurrently, stopping early on cancellation.
pub struct BatchExtractor {
    extractor: Arc<DocumentExtractor>,
    concurrency: usize,
}

impl BatchExtractor {
    pub fn new(extractor: Arc<DocumentExtractor>, concurrency: usize) -> Self {
        Self {
            extractor,
            concurrency: concurrency.max(1),
        }
    }

    /// Setting `cancel` to `true` stops the batch. Records finished before
    /// that are returned; in-flight documents are dropped.
    pub async fn run(&self, documents: Vec<SourceDocument>, mut cancel: watch::Receiver<bool>) -> BatchReport {
        let total = documents.len();
        let mut report = BatchReport::default();
        if *cancel.borrow() {
            report.cancelled = true;
            return report;
        }

        let extractor = &self.extractor;
        let mut pending = stream::iter(documents)
            .map(|document| async move { extractor.extract_record(&document).await })
            .buffer_unordered(self.concurrency);

        let mut watching = true;
        loop {
            tokio::select! {
                biased;
                changed = cancel.changed(), if watching => {
                    if changed.is_err() {
                        // Sender gone: nobody can cancel any more.
                        watching = false;
                    } else if *cancel.borrow() {
                        report.cancelled = true;
                        break;
                    }
                }
                next = pending.next() => match next {
                    Some(record) => {
                        match record.extraction_method {
                            ExtractionMethod::Llm => report.llm_count += 1,
                            ExtractionMethod::Heuristic => report.heuristic_count += 1,
                        }
                        report.records.push(record);
                    }
                    None => break,
                },
            }
        }

        report.records.sort_by_key(|r| r.sequence_id);
        if report.cancelled {
            warn!(done = report.records.len(), total, "extraction cancelled");
        } else {
            info!(
                total,
                llm = report.llm_count,
                heuristic = report.heuristic_count,
                "extraction finished"
            );
        }
        report
    }
}
