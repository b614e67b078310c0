//! Progress tracking for exports
//!
//! Counts exported documents and collections while a traversal runs and can
//! display a spinner on stderr, so stdout stays reserved for the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;

/// Counters of a finished (or running) export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub documents: u64,
    pub collections: u64,
    pub elapsed_ms: u64,
}

/// Progress tracker shared by every task of a traversal.
pub struct ProgressTracker {
    documents: AtomicU64,
    collections: AtomicU64,
    start_time: Instant,
    /// Spinner (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a tracker, optionally drawing a spinner on stderr.
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} documents {msg}")
            {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });

        Self {
            documents: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// A tracker that only counts.
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Record one exported document.
    pub fn document_exported(&self) {
        let count = self.documents.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = count as f64 / elapsed;
                bar.set_message(format!("({:.0} docs/sec)", speed));
            }
        }
    }

    pub fn collection_exported(&self) {
        self.collections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> ExportSummary {
        ExportSummary {
            documents: self.documents.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
            elapsed_ms: u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("summary", &self.summary())
            .field("bar", &self.bar.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_documents_and_collections() {
        let tracker = ProgressTracker::hidden();
        tracker.document_exported();
        tracker.document_exported();
        tracker.collection_exported();

        let summary = tracker.summary();
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.collections, 1);
        tracker.finish();
    }

    #[test]
    fn test_summary_serializes() {
        let tracker = ProgressTracker::hidden();
        tracker.collection_exported();
        let value = serde_json::to_value(tracker.summary()).unwrap();
        assert_eq!(value["documents"], 0);
        assert_eq!(value["collections"], 1);
        assert!(value["elapsed_ms"].is_u64());
    }
}
