//! PDF rasterisation: render pages to images via pdfium and save them.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. [`rasterize_document`] moves the
//! work onto tokio's blocking pool so the runtime threads stay free for model
//! calls.
//!
//! ## Contrast
//!
//! Scans of thermal-paper receipts are often faint. Pages are pushed away
//! from their mean luma by `contrast_factor` before being saved, which makes
//! receipt edges easier for the vision model to find.

use crate::config::{ExtractionConfig, PageFormat};
use crate::error::ReceiptError;
use crate::pipeline::input::page_file_name;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages at a fixed resolution and contrast.
pub struct PageRasterizer {
    pdfium: Pdfium,
    dpi: u32,
    contrast_factor: f32,
    max_rendered_pixels: Option<u32>,
}

impl PageRasterizer {
    /// Bind pdfium and capture render settings.
    pub fn new(
        dpi: u32,
        contrast_factor: f32,
        max_rendered_pixels: Option<u32>,
    ) -> Result<Self, ReceiptError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
            dpi,
            contrast_factor,
            max_rendered_pixels,
        })
    }

    fn open<'a>(&'a self, pdf_path: &Path) -> Result<PdfDocument<'a>, ReceiptError> {
        self.pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ReceiptError::PdfOpenFailed {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })
    }

    /// Number of pages in a document.
    pub fn page_count(&self, pdf_path: &Path) -> Result<usize, ReceiptError> {
        Ok(self.open(pdf_path)?.pages().len() as usize)
    }

    /// Render one page (0-based `page_index`) to an RGB image.
    pub fn render(&self, pdf_path: &Path, page_index: usize) -> Result<RgbImage, ReceiptError> {
        let document = self.open(pdf_path)?;
        self.render_loaded(&document, page_index)
    }

    fn render_loaded(
        &self,
        document: &PdfDocument<'_>,
        page_index: usize,
    ) -> Result<RgbImage, ReceiptError> {
        let pages = document.pages();
        let total = pages.len() as usize;
        if page_index >= total {
            return Err(ReceiptError::PageOutOfRange {
                page: page_index + 1,
                total,
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| ReceiptError::RasterisationFailed {
                page: page_index + 1,
                detail: format!("{:?}", e),
            })?;

        let mut render_config =
            PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / POINTS_PER_INCH);
        if let Some(max) = self.max_rendered_pixels {
            render_config = render_config
                .set_maximum_width(max as i32)
                .set_maximum_height(max as i32);
        }

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ReceiptError::RasterisationFailed {
                page: page_index + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let mut image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            page_index + 1,
            image.width(),
            image.height()
        );

        if (self.contrast_factor - 1.0).abs() > f32::EPSILON {
            debug!(
                "Applying contrast enhancement with factor {}",
                self.contrast_factor
            );
            enhance_contrast(&mut image, self.contrast_factor);
        }

        Ok(image)
    }

    /// Render every page of `pdf_path` into `pages_dir`.
    ///
    /// Pages that fail to render or save are logged and left out; the
    /// returned list holds the files actually written.
    pub fn rasterize_to_dir(
        &self,
        pdf_path: &Path,
        pages_dir: &Path,
        format: PageFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<PathBuf>, ReceiptError> {
        info!("Converting all pages in {} to {:?}", pdf_path.display(), format);
        let document = self.open(pdf_path)?;
        let total = document.pages().len() as usize;
        info!("PDF has {} pages", total);

        let mut written = Vec::with_capacity(total);
        for idx in 0..total {
            let out = pages_dir.join(page_file_name(pdf_path, idx + 1, format));
            let result = self
                .render_loaded(&document, idx)
                .and_then(|img| save_page(&img, &out, idx + 1, format, jpeg_quality));
            match result {
                Ok(()) => {
                    info!("Saved page {} to {}", idx + 1, out.display());
                    written.push(out);
                }
                Err(e) => error!("Error processing page {}: {}", idx + 1, e),
            }
        }

        info!(
            "Converted {} out of {} pages of {}",
            written.len(),
            total,
            pdf_path.display()
        );
        Ok(written)
    }
}

/// Rasterise a whole document on the blocking pool.
pub async fn rasterize_document(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>, ReceiptError> {
    let path = pdf_path.to_path_buf();
    let pages_dir = config.pages_dir.clone();
    let (dpi, contrast, max_px) = (config.dpi, config.contrast_factor, config.max_rendered_pixels);
    let (format, quality) = (config.page_format, config.jpeg_quality);

    tokio::task::spawn_blocking(move || {
        PageRasterizer::new(dpi, contrast, max_px)?.rasterize_to_dir(&path, &pages_dir, format, quality)
    })
    .await
    .map_err(|e| ReceiptError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind the pdfium library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, the executable's directory, the working
/// directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ReceiptError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| ReceiptError::PdfiumBindingFailed(format!("{path}: {e:?}")));
        }
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let candidates = exe_dir.into_iter().chain(std::iter::once(PathBuf::from("./")));

    for dir in candidates {
        let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            debug!("Bound pdfium from {:?}", lib);
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ReceiptError::PdfiumBindingFailed(format!("{e:?}")))
}

fn save_page(
    img: &RgbImage,
    out: &Path,
    page: usize,
    format: PageFormat,
    jpeg_quality: u8,
) -> Result<(), ReceiptError> {
    let failed = |e: &dyn std::fmt::Display| ReceiptError::RasterisationFailed {
        page,
        detail: format!("cannot write {}: {}", out.display(), e),
    };
    match format {
        PageFormat::Png => img
            .save_with_format(out, image::ImageFormat::Png)
            .map_err(|e| failed(&e)),
        PageFormat::Jpeg => {
            let file = File::create(out).map_err(|e| failed(&e))?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), jpeg_quality);
            img.write_with_encoder(encoder).map_err(|e| failed(&e))
        }
    }
}

/// Scale every channel's distance from the image's mean luma by `factor`.
///
/// `factor == 1.0` leaves the image untouched, `0.0` produces a flat grey at
/// the mean, and values above 1.0 increase contrast.
pub fn enhance_contrast(img: &mut RgbImage, factor: f32) {
    let pixels = u64::from(img.width()) * u64::from(img.height());
    if pixels == 0 {
        return;
    }

    let luma_sum: u64 = img
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (u64::from(r) * 299 + u64::from(g) * 587 + u64::from(b) * 114) / 1000
        })
        .sum();
    let mean = (luma_sum as f32 / pixels as f32).round();

    for p in img.pixels_mut() {
        for c in p.0.iter_mut() {
            let v = mean + factor * (f32::from(*c) - mean);
            *c = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn two_tone() -> RgbImage {
        RgbImage::from_fn(4, 1, |x, _| if x < 2 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) })
    }

    #[test]
    fn contrast_factor_one_is_identity() {
        let mut img = two_tone();
        let before = img.clone();
        enhance_contrast(&mut img, 1.0);
        assert_eq!(img, before);
    }

    #[test]
    fn contrast_factor_zero_flattens_to_mean() {
        let mut img = two_tone();
        enhance_contrast(&mut img, 0.0);
        assert!(img.pixels().all(|p| p.0 == [150, 150, 150]));
    }

    #[test]
    fn contrast_factor_two_doubles_distance_and_clamps() {
        let mut img = two_tone();
        enhance_contrast(&mut img, 2.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([50, 50, 50]));
        assert_eq!(img.get_pixel(3, 0), &Rgb([250, 250, 250]));

        enhance_contrast(&mut img, 4.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(3, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn contrast_on_empty_image_is_noop() {
        let mut img = RgbImage::new(0, 0);
        enhance_contrast(&mut img, 2.0);
        assert_eq!(img.dimensions(), (0, 0));
    }

    #[test]
    fn jpeg_pages_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc_page_1.jpg");
        save_page(&two_tone(), &out, 1, PageFormat::Jpeg, 94).unwrap();
        let back = image::open(&out).unwrap();
        assert_eq!((back.width(), back.height()), (4, 1));
    }
}
