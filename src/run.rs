//! Run orchestration: rasterise → ask the model → parse → crop → save.
//!
//! A run is folder-to-folder. PDFs in `input_dir` become page images in
//! `pages_dir`; every page image found there is sent to the vision model and
//! the receipts it locates are written to `receipts_dir`.
//!
//! Only setup problems abort a run (see [`ReceiptError`]). Once pages are
//! being processed, a failing document, page or region is logged, counted in
//! [`RunStats`] and skipped.

use crate::config::ExtractionConfig;
use crate::error::{PageError, ReceiptError};
use crate::observer::ExtractionObserver;
use crate::output::{PageOutcome, RunStats};
use crate::pipeline::encode::encode_image_bytes;
use crate::pipeline::extract::{extract_all, SourceImage};
use crate::pipeline::input::{display_name, ensure_dir, list_page_images, list_pdfs, receipt_file_name};
use crate::pipeline::llm::{request_boxes, VisionClient};
use crate::pipeline::parse::parse_bounding_boxes;
use crate::pipeline::render::rasterize_document;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Run the whole pipeline once.
///
/// # Errors
/// Returns `Err(ReceiptError)` only for fatal problems detected before page
/// processing starts:
/// - no credential for the model backend
/// - `input_dir` missing
/// - output folders cannot be created or listed
/// - pdfium cannot be bound
///
/// An empty pages folder is not an error: the run logs a warning and returns
/// zeroed stats.
pub async fn run(
    config: &ExtractionConfig,
    observer: &dyn ExtractionObserver,
) -> Result<RunStats, ReceiptError> {
    let total_start = Instant::now();

    // ── Step 1: Resolve the model backend ────────────────────────────────
    let client = VisionClient::from_config(config)?;
    debug!("Using vision backend {:?}", client);

    // ── Step 2: Check folders ────────────────────────────────────────────
    if !config.input_dir.is_dir() {
        return Err(ReceiptError::InputDirUnavailable {
            path: config.input_dir.clone(),
        });
    }
    ensure_dir(&config.pages_dir)?;
    ensure_dir(&config.receipts_dir)?;

    let mut stats = RunStats::default();

    // ── Step 3: Rasterise documents ──────────────────────────────────────
    if config.skip_rasterize {
        info!("Skipping PDF rasterisation");
    } else {
        let pdfs = list_pdfs(&config.input_dir)?;
        info!("Found {} PDF files in {}", pdfs.len(), config.input_dir.display());
        stats.documents = pdfs.len();

        for pdf in &pdfs {
            match rasterize_document(pdf, config).await {
                Ok(pages) => stats.pages_rasterized += pages.len(),
                Err(e @ ReceiptError::PdfiumBindingFailed(_)) => return Err(e),
                Err(e) => error!("Error processing {}: {}", pdf.display(), e),
            }
        }
    }

    // ── Step 4: Discover page images ─────────────────────────────────────
    let pages = list_page_images(&config.pages_dir)?;
    stats.pages_total = pages.len();
    if pages.is_empty() {
        warn!("No page images found in {}", config.pages_dir.display());
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        return Ok(stats);
    }
    observer.on_run_start(pages.len());

    // ── Step 5: Process pages ────────────────────────────────────────────
    let client = &client;
    let mut outcomes: Vec<PageOutcome> = if config.concurrency <= 1 {
        let mut outcomes = Vec::with_capacity(pages.len());
        for page in &pages {
            outcomes.push(process_page(client, page, config, observer).await);
        }
        outcomes
    } else {
        stream::iter(
            pages
                .iter()
                .map(move |page| process_page(client, page, config, observer)),
        )
        .buffer_unordered(config.concurrency)
        .collect()
        .await
    };
    outcomes.sort_by(|a, b| a.page.cmp(&b.page));

    // ── Step 6: Totals ───────────────────────────────────────────────────
    for outcome in &outcomes {
        stats.record(outcome);
    }
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    observer.on_run_complete(&stats);

    Ok(stats)
}

/// Send one page image to the model and save the receipts it finds.
///
/// Never fails: problems are reported through `observer` and recorded in the
/// returned outcome's `error`.
pub async fn process_page(
    client: &VisionClient,
    path: &Path,
    config: &ExtractionConfig,
    observer: &dyn ExtractionObserver,
) -> PageOutcome {
    let start = Instant::now();
    let page = display_name(path);
    observer.on_page_start(&page);

    let mut outcome = match request_page(client, path, &page, config).await {
        Ok((source, text, retries)) => {
            let mut outcome = extract_and_save(&page, &source, &text, config, observer);
            outcome.retries = retries;
            outcome
        }
        Err(e) => {
            observer.on_page_error(&e);
            PageOutcome {
                page,
                error: Some(e),
                ..Default::default()
            }
        }
    };

    outcome.duration_ms = start.elapsed().as_millis() as u64;
    observer.on_page_complete(&outcome);
    outcome
}

async fn request_page(
    client: &VisionClient,
    path: &Path,
    page: &str,
    config: &ExtractionConfig,
) -> Result<(SourceImage, String, u32), PageError> {
    let unreadable = |detail: String| PageError::ImageUnreadable {
        page: page.to_string(),
        detail,
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| unreadable(e.to_string()))?;
    let source = SourceImage::from_dynamic(decoded);
    debug!("{}: {}x{} px", page, source.width(), source.height());

    let answer = request_boxes(client, page, encode_image_bytes(&bytes), config).await?;
    debug!("{}: model answered in {}ms", page, answer.duration_ms);
    Ok((source, answer.text, answer.retries))
}

/// Parse a model answer for `page`, crop the boxes out of `source` and write
/// them to `config.receipts_dir`.
///
/// Receipts are numbered by their position among the successful crops,
/// starting at 1, so the files for a page are always `_1`, `_2`, … with no
/// gaps.
pub fn extract_and_save(
    page: &str,
    source: &SourceImage,
    response: &str,
    config: &ExtractionConfig,
    observer: &dyn ExtractionObserver,
) -> PageOutcome {
    let descriptors = parse_bounding_boxes(response);
    observer.on_boxes_parsed(page, descriptors.len());

    let mut outcome = PageOutcome {
        page: page.to_string(),
        boxes_found: descriptors.len(),
        ..Default::default()
    };
    if descriptors.is_empty() {
        return outcome;
    }

    let receipts = extract_all(source, &descriptors, config.padding, page, observer);
    outcome.regions_skipped = descriptors.len() - receipts.len();

    for (i, receipt) in receipts.iter().enumerate() {
        let index = i + 1;
        let out = config.receipts_dir.join(receipt_file_name(page, index));
        match receipt.image.save_with_format(&out, image::ImageFormat::Png) {
            Ok(()) => {
                observer.on_receipt_saved(page, index, &out);
                outcome.receipt_paths.push(out);
            }
            Err(e) => {
                error!("Failed to save receipt {} to {}: {}", index, out.display(), e);
                outcome.regions_skipped += 1;
            }
        }
    }
    outcome.receipts_saved = outcome.receipt_paths.len();
    outcome
}

/// Model ids offered by the configured OpenAI-compatible endpoint.
pub async fn list_models(config: &ExtractionConfig) -> Result<Vec<String>, ReceiptError> {
    VisionClient::from_config(config)?.list_models().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use image::{Rgb, RgbImage};

    fn config_for(dir: &Path) -> ExtractionConfig {
        ExtractionConfig::builder()
            .api_key("sk-test")
            .input_dir(dir.join("input"))
            .pages_dir(dir.join("pages"))
            .receipts_dir(dir.join("receipts"))
            .skip_rasterize(true)
            .build()
            .unwrap()
    }

    fn page_image() -> SourceImage {
        SourceImage::from(RgbImage::from_pixel(200, 100, Rgb([240, 240, 240])))
    }

    #[test]
    fn receipts_are_numbered_without_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        ensure_dir(&config.receipts_dir).unwrap();

        let response = r#"```json
{"bounding_boxes": [
  {"bbox": [10, 10, 60, 60]},
  {"bbox": [50, 50, 50, 90]},
  {"coordinates": [100, 10, 190, 90]}
]}
```"#;
        let outcome = extract_and_save("scan_page_1.png", &page_image(), response, &config, &NoopObserver);

        assert_eq!(outcome.boxes_found, 3);
        assert_eq!(outcome.receipts_saved, 2);
        assert_eq!(outcome.regions_skipped, 1);
        let names: Vec<String> = outcome
            .receipt_paths
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(
            names,
            vec!["receipt_scan_page_1.png_1.png", "receipt_scan_page_1.png_2.png"]
        );

        let first = image::open(&outcome.receipt_paths[0]).unwrap();
        assert_eq!((first.width(), first.height()), (80, 80));
    }

    #[test]
    fn unparseable_answer_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        ensure_dir(&config.receipts_dir).unwrap();

        let outcome = extract_and_save("p.png", &page_image(), "no receipts here", &config, &NoopObserver);
        assert_eq!(outcome.boxes_found, 0);
        assert_eq!(outcome.receipts_saved, 0);
        assert!(outcome.error.is_none());
        assert_eq!(std::fs::read_dir(&config.receipts_dir).unwrap().count(), 0);
    }

    #[test]
    fn missing_receipts_dir_counts_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());

        let outcome = extract_and_save("p.png", &page_image(), "[[0, 0, 20, 20]]", &config, &NoopObserver);
        assert_eq!(outcome.boxes_found, 1);
        assert_eq!(outcome.receipts_saved, 0);
        assert_eq!(outcome.regions_skipped, 1);
    }

    #[tokio::test]
    async fn missing_input_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let err = run(&config, &NoopObserver).await.unwrap_err();
        assert!(matches!(err, ReceiptError::InputDirUnavailable { .. }));
    }

    #[tokio::test]
    async fn empty_pages_dir_is_a_successful_noop() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        std::fs::create_dir_all(&config.input_dir).unwrap();

        let stats = run(&config, &NoopObserver).await.unwrap();
        assert_eq!(stats.pages_total, 0);
        assert_eq!(stats.receipts_saved, 0);
        assert!(config.pages_dir.is_dir());
        assert!(config.receipts_dir.is_dir());
    }
}
