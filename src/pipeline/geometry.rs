//! Geometry normalisation: one [`RegionDescriptor`] → one [`NormalizedBox`].
//!
//! Two encodings are accepted:
//!
//! * **4 values** `(x1, y1, a, b)`. Models mix up corner pairs and
//!   origin-plus-size, and never say which one they used. If the second point
//!   lies above or left of the first (`a < x1 || b < y1`) it cannot be a
//!   corner, so it is read as a width/height offset; otherwise as the
//!   bottom-right corner. Small origin-plus-size boxes near the top-left
//!   corner (`[10, 10, 40, 40]` meaning 40×40) are therefore read as corners.
//!   That ambiguity is inherent to the input and left as is.
//! * **8 values**, four `(x, y)` vertices of a possibly rotated quadrilateral,
//!   reduced to their axis-aligned bounding rectangle.

use crate::error::RegionError;
use crate::region::{NormalizedBox, RegionDescriptor};

/// Convert a descriptor into a validated box inside a `width × height` image.
///
/// Values are truncated toward zero, clamped to the image, and rejected when
/// nothing of the box is left.
pub fn normalize(
    descriptor: &RegionDescriptor,
    width: u32,
    height: u32,
) -> Result<NormalizedBox, RegionError> {
    let coords = descriptor.coordinates()?;

    let (x1, y1, x2, y2) = match coords.as_slice() {
        &[x1, y1, a, b] => {
            if a < x1 || b < y1 {
                (x1, y1, x1 + a, y1 + b)
            } else {
                (x1, y1, a, b)
            }
        }
        &[_, _, _, _, _, _, _, _] => {
            let xs = coords.iter().step_by(2).copied();
            let ys = coords.iter().skip(1).step_by(2).copied();
            (
                xs.clone().fold(f64::INFINITY, f64::min),
                ys.clone().fold(f64::INFINITY, f64::min),
                xs.fold(f64::NEG_INFINITY, f64::max),
                ys.fold(f64::NEG_INFINITY, f64::max),
            )
        }
        other => return Err(RegionError::UnsupportedLength(other.len())),
    };

    clamp_to_image(
        x1.trunc() as i64,
        y1.trunc() as i64,
        x2.trunc() as i64,
        y2.trunc() as i64,
        width,
        height,
    )
}

fn clamp_to_image(
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
    width: u32,
    height: u32,
) -> Result<NormalizedBox, RegionError> {
    let x1 = x1.max(0);
    let y1 = y1.max(0);
    let x2 = x2.min(i64::from(width));
    let y2 = y2.min(i64::from(height));

    if x1 >= x2 || y1 >= y2 {
        return Err(RegionError::Degenerate { x1, y1, x2, y2 });
    }

    // 0 <= x1 < x2 <= width, so every value fits in u32.
    Ok(NormalizedBox {
        x1: x1 as u32,
        y1: y1 as u32,
        x2: x2 as u32,
        y2: y2 as u32,
    })
}
