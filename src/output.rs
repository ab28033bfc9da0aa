//! Result types returned by a run.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one page image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageOutcome {
    /// Page image file name, e.g. `statement_page_2.png`.
    pub page: String,
    /// Region descriptors found in the model answer.
    pub boxes_found: usize,
    /// Receipts written to disk.
    pub receipts_saved: usize,
    /// Descriptors that produced no receipt, plus receipts that failed to save.
    pub regions_skipped: usize,
    /// Paths of the written receipts, in descriptor order.
    pub receipt_paths: Vec<PathBuf>,
    /// Model call attempts beyond the first.
    pub retries: u32,
    pub duration_ms: u64,
    /// Set when the page could not be processed at all.
    pub error: Option<PageError>,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// PDF documents found in the input folder (0 when rasterisation is skipped).
    pub documents: usize,
    /// Pages rasterised during this run.
    pub pages_rasterized: usize,
    /// Page images found in the pages folder.
    pub pages_total: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
    /// Pages whose model answer held no usable boxes.
    pub pages_without_boxes: usize,
    pub receipts_saved: usize,
    pub regions_skipped: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Fold one page outcome into the totals.
    pub fn record(&mut self, outcome: &PageOutcome) {
        if outcome.error.is_some() {
            self.pages_failed += 1;
            return;
        }
        self.pages_processed += 1;
        if outcome.boxes_found == 0 {
            self.pages_without_boxes += 1;
        }
        self.receipts_saved += outcome.receipts_saved;
        self.regions_skipped += outcome.regions_skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_failed_and_empty_pages() {
        let mut stats = RunStats::default();
        stats.record(&PageOutcome {
            page: "a.png".into(),
            boxes_found: 3,
            receipts_saved: 2,
            regions_skipped: 1,
            ..Default::default()
        });
        stats.record(&PageOutcome {
            page: "b.png".into(),
            ..Default::default()
        });
        stats.record(&PageOutcome {
            page: "c.png".into(),
            error: Some(PageError::ImageUnreadable {
                page: "c.png".into(),
                detail: "truncated".into(),
            }),
            ..Default::default()
        });

        assert_eq!(stats.pages_processed, 2);
        assert_eq!(stats.pages_failed, 1);
        assert_eq!(stats.pages_without_boxes, 1);
        assert_eq!(stats.receipts_saved, 2);
        assert_eq!(stats.regions_skipped, 1);
    }
}
