//! Input discovery and output naming.
//!
//! Documents are found by extension in the input folder, page images by
//! extension in the pages folder. Listings are sorted by file name so runs
//! over the same folders always visit pages in the same order.

use crate::config::PageFormat;
use crate::error::ReceiptError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions recognised as page images.
pub const PAGE_IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// `*.pdf` files directly inside `dir`, sorted by name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ReceiptError> {
    list_with_extensions(dir, &["pdf"])
}

/// Page images directly inside `dir`, sorted by name.
pub fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>, ReceiptError> {
    list_with_extensions(dir, &PAGE_IMAGE_EXTENSIONS)
}

fn list_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, ReceiptError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ReceiptError::ListFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    files.sort();
    debug!("Found {} matching files in {}", files.len(), dir.display());
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), ReceiptError> {
    std::fs::create_dir_all(dir).map_err(|source| ReceiptError::OutputDirFailed {
        path: dir.to_path_buf(),
        source,
    })
}

/// `{document stem}_page_{page}.{ext}` — `page` is 1-based.
pub fn page_file_name(pdf_path: &Path, page: usize, format: PageFormat) -> String {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_else(|| "document".into());
    format!("{}_page_{}.{}", stem, page, format.extension())
}

/// `receipt_{page file name}_{index}.png` — `index` is 1-based per page.
pub fn receipt_file_name(page_file: &str, index: usize) -> String {
    format!("receipt_{}_{}.png", page_file, index)
}

/// File name component of a path, for logs and output naming.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_are_one_based_with_stem() {
        let name = page_file_name(Path::new("/scans/march.statement.pdf"), 1, PageFormat::Png);
        assert_eq!(name, "march.statement_page_1.png");
        let name = page_file_name(Path::new("b.pdf"), 12, PageFormat::Jpeg);
        assert_eq!(name, "b_page_12.jpg");
    }

    #[test]
    fn receipt_names_keep_page_extension() {
        assert_eq!(
            receipt_file_name("scan_page_2.png", 3),
            "receipt_scan_page_2.png_3.png"
        );
    }

    #[test]
    fn listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_page_2.png", "a_page_1.JPG", "notes.txt", "c.jpeg", "doc.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let pages: Vec<String> = list_page_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(pages, vec!["a_page_1.JPG", "b_page_2.png", "c.jpeg"]);

        let pdfs = list_pdfs(dir.path()).unwrap();
        assert_eq!(pdfs.len(), 1);
    }

    #[test]
    fn listing_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_pdfs(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ReceiptError::ListFailed { .. }));
    }

    #[test]
    fn ensure_dir_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output/receipts");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
