//! Error types for the receipt-extract library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ReceiptError`] — **Fatal**: the run cannot start at all (missing
//!   credential, missing input directory, pdfium unavailable). Returned as
//!   `Err(ReceiptError)` from [`crate::run::run`] before any page is touched.
//!
//! * [`PageError`] — **Non-fatal**: one page failed (unreadable image, model
//!   call exhausted its retries). Stored inside [`crate::output::PageOutcome`]
//!   so the remaining pages still get processed.
//!
//! * [`RegionError`] — **Per region**: one model-provided box was rejected by
//!   the geometry stage. The extractor reports it to the observer and moves on
//!   to the next box.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the receipt-extract library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API credential was supplied for the OpenAI-compatible backend.
    #[error("No API key configured.\nSet {var} or pass --api-key.")]
    MissingCredential { var: String },

    /// The configured provider could not be created (missing key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Filesystem errors ─────────────────────────────────────────────────
    /// The input directory does not exist or cannot be listed.
    #[error("Input folder '{path}' does not exist or cannot be read")]
    InputDirUnavailable { path: PathBuf },

    /// An output directory could not be created.
    #[error("Failed to create output folder '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory listing failed after the directory was found.
    #[error("Failed to list '{path}': {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF file is missing, corrupt or otherwise unreadable by pdfium.
    #[error("Failed to open PDF '{path}': {detail}")]
    PdfOpenFailed { path: PathBuf, detail: String },

    /// The requested page does not exist in the document.
    #[error("Invalid page number {page}. PDF has {total} pages.")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform and either place it next to the\n\
executable, in the working directory, or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model endpoint returned an error outside of per-page processing.
    #[error("Model API error: {message}")]
    ModelApiError { message: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The overall run continues with the next page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page image could not be read or decoded.
    #[error("{page}: image unreadable: {detail}")]
    ImageUnreadable { page: String, detail: String },

    /// Model call failed after retries.
    #[error("{page}: model call failed after {retries} retries: {detail}")]
    ModelFailed {
        page: String,
        retries: u32,
        detail: String,
    },
}

/// Why a region descriptor produced no receipt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    /// Descriptor matches none of the known shapes.
    #[error("unrecognized bounding box format: {0}")]
    UnrecognizedShape(String),

    /// The coordinate field is present but is not an array.
    #[error("coordinates are not a sequence: {0}")]
    NotASequence(String),

    /// The coordinate sequence is neither 4 nor 8 values long.
    #[error("unexpected coordinate count {0} (expected 4 or 8)")]
    UnsupportedLength(usize),

    /// A coordinate is not a number.
    #[error("coordinate at position {position} is not numeric: {value}")]
    NonNumeric { position: usize, value: String },

    /// Box has no area once clamped to the image.
    #[error("invalid bounding box dimensions: ({x1}, {y1}, {x2}, {y2})")]
    Degenerate { x1: i64, y1: i64, x2: i64, y2: i64 },

    /// Padded crop rectangle has no area.
    #[error("cropped image is empty")]
    EmptyCrop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_variable() {
        let e = ReceiptError::MissingCredential {
            var: "LLM_VENICE_KEY".into(),
        };
        assert!(e.to_string().contains("LLM_VENICE_KEY"));
    }

    #[test]
    fn page_out_of_range_display() {
        let e = ReceiptError::PageOutOfRange { page: 7, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains("7"), "got: {msg}");
        assert!(msg.contains("3 pages"), "got: {msg}");
    }

    #[test]
    fn degenerate_region_display() {
        let e = RegionError::Degenerate {
            x1: 10,
            y1: 10,
            x2: 10,
            y2: 40,
        };
        assert_eq!(
            e.to_string(),
            "invalid bounding box dimensions: (10, 10, 10, 40)"
        );
    }

    #[test]
    fn page_error_round_trips_through_json() {
        let e = PageError::ModelFailed {
            page: "scan_page_1.png".into(),
            retries: 2,
            detail: "HTTP 503".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), e.to_string());
    }
}
