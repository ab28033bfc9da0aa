//! # receipt-extract
//!
//! Find receipts on scanned PDF pages with a Vision Language Model (VLM) and
//! save each one as its own image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/*.pdf
//!  │
//!  ├─ 1. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode   page image → base64 data URL
//!  ├─ 3. VLM      ask qwen-2.5-vl (or any vision model) for bounding boxes
//!  ├─ 4. Parse    fenced / bare JSON → region descriptors
//!  ├─ 5. Geometry 4-value or 8-value boxes → clamped pixel rectangles
//!  └─ 6. Extract  pad by 20 px, crop, save receipt_{page}_{n}.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_extract::{run, ExtractionConfig, TracingObserver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from LLM_VENICE_KEY when not set explicitly
//!     let config = ExtractionConfig::builder()
//!         .input_dir("scans")
//!         .receipts_dir("out/receipts")
//!         .build()?;
//!     let stats = run(&config, &TracingObserver).await?;
//!     eprintln!("{} receipts from {} pages", stats.receipts_saved, stats.pages_processed);
//!     Ok(())
//! }
//! ```
//!
//! The geometry stages need no network or pdfium and can be used alone:
//!
//! ```rust
//! use receipt_extract::pipeline::{extract::{extract_all, SourceImage}, parse::parse_bounding_boxes};
//! use receipt_extract::NoopObserver;
//! use image::RgbImage;
//!
//! let page = SourceImage::from(RgbImage::new(100, 100));
//! let boxes = parse_bounding_boxes(r#"{"bounding_boxes": [{"bbox": [0, 0, 50, 50]}]}"#);
//! let receipts = extract_all(&page, &boxes, 20, "page.png", &NoopObserver);
//! assert_eq!(receipts[0].image.dimensions(), (70, 70));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipts` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod region;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageFormat};
pub use error::{PageError, ReceiptError, RegionError};
pub use observer::{ExtractionObserver, NoopObserver, SharedObserver, TracingObserver};
pub use output::{PageOutcome, RunStats};
pub use region::{CropRect, NormalizedBox, RegionDescriptor};
pub use run::{extract_and_save, list_models, process_page, run};
