//! Observer trait for run, page and region events.
//!
//! Components never reach for a global logger to report what they skipped;
//! they receive an [`ExtractionObserver`] and call it. The default,
//! [`TracingObserver`], forwards every event to `tracing`, so the sink is
//! whatever subscriber the binary installed at startup. The CLI wraps it with
//! a progress bar; tests plug in counters.
//!
//! All methods have default no-op implementations so implementors only
//! override what they care about. Implementations must be `Send + Sync`
//! because pages may be processed concurrently.

use crate::error::{PageError, RegionError};
use crate::output::{PageOutcome, RunStats};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Receives events as the pipeline works through pages and regions.
pub trait ExtractionObserver: Send + Sync {
    /// Called once the page list is known, before any model call.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model request is sent for a page.
    fn on_page_start(&self, page: &str) {
        let _ = page;
    }

    /// Called when the model answer for a page has been parsed.
    fn on_boxes_parsed(&self, page: &str, count: usize) {
        let _ = (page, count);
    }

    /// Called for every region that produced no receipt.
    ///
    /// `index` is the 1-based position of the descriptor in the model answer.
    fn on_region_skipped(&self, page: &str, index: usize, reason: &RegionError) {
        let _ = (page, index, reason);
    }

    /// Called after a receipt image has been written.
    fn on_receipt_saved(&self, page: &str, index: usize, path: &Path) {
        let _ = (page, index, path);
    }

    /// Called when a page is finished, successfully or not.
    fn on_page_complete(&self, outcome: &PageOutcome) {
        let _ = outcome;
    }

    /// Called when a page fails.
    fn on_page_error(&self, error: &PageError) {
        let _ = error;
    }

    /// Called once after every page has been attempted.
    fn on_run_complete(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// Observer that reports nothing.
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Default observer: every event becomes a `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExtractionObserver for TracingObserver {
    fn on_run_start(&self, total_pages: usize) {
        info!("Processing {} page images", total_pages);
    }

    fn on_page_start(&self, page: &str) {
        info!("Extracting receipts from page {}...", page);
    }

    fn on_boxes_parsed(&self, page: &str, count: usize) {
        if count == 0 {
            warn!("No bounding boxes found in the response for {}.", page);
        } else {
            info!("Found {} bounding boxes for {}", count, page);
        }
    }

    fn on_region_skipped(&self, page: &str, index: usize, reason: &RegionError) {
        warn!("{}: skipping bounding box {}: {}", page, index, reason);
    }

    fn on_receipt_saved(&self, _page: &str, index: usize, path: &Path) {
        info!("Saved receipt {} to {}", index, path.display());
    }

    fn on_page_complete(&self, outcome: &PageOutcome) {
        if outcome.error.is_none() {
            info!(
                "{}: {} of {} boxes saved as receipts",
                outcome.page, outcome.receipts_saved, outcome.boxes_found
            );
        }
    }

    fn on_page_error(&self, err: &PageError) {
        error!("Error processing {}", err);
    }

    fn on_run_complete(&self, stats: &RunStats) {
        info!(
            "Done: {}/{} pages processed, {} receipts saved, {} regions skipped",
            stats.pages_processed, stats.pages_total, stats.receipts_saved, stats.regions_skipped
        );
    }
}

/// Convenience alias for a shared observer.
pub type SharedObserver = Arc<dyn ExtractionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        skipped: AtomicUsize,
        saved: AtomicUsize,
    }

    impl ExtractionObserver for CountingObserver {
        fn on_region_skipped(&self, _page: &str, _index: usize, _reason: &RegionError) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_receipt_saved(&self, _page: &str, _index: usize, _path: &Path) {
            self.saved.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        obs.on_run_start(3);
        obs.on_page_start("a.png");
        obs.on_boxes_parsed("a.png", 2);
        obs.on_region_skipped("a.png", 1, &RegionError::EmptyCrop);
        obs.on_receipt_saved("a.png", 1, Path::new("receipt_a.png_1.png"));
        obs.on_run_complete(&RunStats::default());
    }

    #[test]
    fn default_methods_leave_overrides_working() {
        let obs = CountingObserver::default();
        obs.on_page_start("p.png");
        obs.on_region_skipped("p.png", 2, &RegionError::UnsupportedLength(3));
        obs.on_receipt_saved("p.png", 1, Path::new("x.png"));
        obs.on_receipt_saved("p.png", 2, Path::new("y.png"));
        assert_eq!(obs.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(obs.saved.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: SharedObserver = Arc::new(TracingObserver);
        obs.on_run_start(1);
        obs.on_boxes_parsed("p.png", 0);
    }
}
