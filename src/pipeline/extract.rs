//! Region extraction: crop every valid box out of a page image.
//!
//! Each descriptor is normalised ([`super::geometry::normalize`]), grown by a
//! fixed margin so receipt edges are not shaved off, clamped to the image
//! again, and copied into its own buffer. A bad descriptor is reported to the
//! observer and skipped; it never stops the remaining ones.

use super::geometry::normalize;
use crate::error::RegionError;
use crate::observer::ExtractionObserver;
use crate::region::{CropRect, NormalizedBox, RegionDescriptor};
use image::{imageops, DynamicImage, RgbImage};
use tracing::{debug, info};

/// Margin, in pixels, added on every side of a detected box.
pub const RECEIPT_PADDING: u32 = 20;

/// Channel layout of a raw pixel buffer handed to [`SourceImage::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Luma,
}

impl PixelOrder {
    fn channels(self) -> usize {
        match self {
            PixelOrder::Rgb | PixelOrder::Bgr => 3,
            PixelOrder::Rgba | PixelOrder::Bgra => 4,
            PixelOrder::Luma => 1,
        }
    }
}

/// A page image ready for cropping, held as 8-bit RGB.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbImage,
}

impl SourceImage {
    /// Wrap a decoded image of any colour type; alpha is dropped.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        Self {
            pixels: img.to_rgb8(),
        }
    }

    /// Build from a raw interleaved buffer in the given channel order.
    ///
    /// Returns `None` when `data` does not hold exactly `width * height` pixels.
    pub fn from_raw(width: u32, height: u32, order: PixelOrder, data: &[u8]) -> Option<Self> {
        let n = order.channels();
        if data.len() != (width as usize) * (height as usize) * n {
            return None;
        }
        let rgb: Vec<u8> = data
            .chunks_exact(n)
            .flat_map(|px| match order {
                PixelOrder::Rgb | PixelOrder::Rgba => [px[0], px[1], px[2]],
                PixelOrder::Bgr | PixelOrder::Bgra => [px[2], px[1], px[0]],
                PixelOrder::Luma => [px[0], px[0], px[0]],
            })
            .collect();
        RgbImage::from_raw(width, height, rgb).map(|pixels| Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }
}

impl From<RgbImage> for SourceImage {
    fn from(pixels: RgbImage) -> Self {
        Self { pixels }
    }
}

/// One cropped receipt, independent of the page it came from.
#[derive(Debug, Clone)]
pub struct ExtractedReceipt {
    /// Box as reported by the model, after normalisation.
    pub region: NormalizedBox,
    /// Padded rectangle that was copied.
    pub crop: CropRect,
    pub image: RgbImage,
}

/// Crop a single descriptor out of `image`.
pub fn extract_region(
    image: &SourceImage,
    descriptor: &RegionDescriptor,
    padding: u32,
) -> Result<ExtractedReceipt, RegionError> {
    let (width, height) = (image.width(), image.height());
    let region = normalize(descriptor, width, height)?;

    let crop = region.padded(padding, width, height);
    if crop.is_empty() {
        return Err(RegionError::EmptyCrop);
    }

    let cropped = imageops::crop_imm(image.as_rgb(), crop.x, crop.y, crop.width, crop.height)
        .to_image();

    Ok(ExtractedReceipt {
        region,
        crop,
        image: cropped,
    })
}

/// Crop every valid descriptor, preserving input order.
///
/// Rejected descriptors are passed to `observer` with their 1-based position
/// and omitted from the result.
pub fn extract_all(
    image: &SourceImage,
    descriptors: &[RegionDescriptor],
    padding: u32,
    page: &str,
    observer: &dyn ExtractionObserver,
) -> Vec<ExtractedReceipt> {
    info!(
        "Extracting receipts from {} with {} bounding boxes",
        page,
        descriptors.len()
    );

    let mut receipts = Vec::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.iter().enumerate() {
        debug!("Processing bounding box {}: {:?}", i + 1, descriptor);
        match extract_region(image, descriptor, padding) {
            Ok(receipt) => {
                debug!(
                    "Extracted receipt {} with dimensions {}x{}",
                    i + 1,
                    receipt.image.width(),
                    receipt.image.height()
                );
                receipts.push(receipt);
            }
            Err(e) => observer.on_region_skipped(page, i + 1, &e),
        }
    }

    info!("Extracted {} receipts from {}", receipts.len(), page);
    receipts
}
