//! Region types shared by the parse, geometry and extract stages.
//!
//! A model answer is loosely structured: the same page may come back as
//! `[{"bbox": [...]}, ...]`, `{"receipts": [{"coordinates": [...]}]}` or a bare
//! list of number lists. [`RegionDescriptor`] resolves that shape once, when
//! the answer is parsed, so later stages match on an enum instead of probing
//! JSON keys.

use crate::error::RegionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One model-provided candidate rectangle, in any of its raw encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionDescriptor {
    /// `{"coordinates": [...]}`
    Coordinates(Value),
    /// `{"bbox": [...]}`
    Bbox(Value),
    /// `{"bbox_2d": [...]}`
    Bbox2d(Value),
    /// `[x1, y1, ...]`
    Sequence(Vec<Value>),
    /// Anything else; kept so the extractor can report it and move on.
    Unrecognized(Value),
}

impl RegionDescriptor {
    /// Classify a decoded JSON value.
    ///
    /// Keys are checked in a fixed order: `coordinates`, `bbox`, `bbox_2d`,
    /// then a bare array. An object carrying several of these keys takes the
    /// first one in that order.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                if let Some(v) = map.remove("coordinates") {
                    RegionDescriptor::Coordinates(v)
                } else if let Some(v) = map.remove("bbox") {
                    RegionDescriptor::Bbox(v)
                } else if let Some(v) = map.remove("bbox_2d") {
                    RegionDescriptor::Bbox2d(v)
                } else {
                    RegionDescriptor::Unrecognized(Value::Object(map))
                }
            }
            Value::Array(items) => RegionDescriptor::Sequence(items),
            other => RegionDescriptor::Unrecognized(other),
        }
    }

    /// The raw coordinate values, as numbers.
    ///
    /// Integer strings (`"120"`) are accepted since some models quote every
    /// value. Fractional strings (`"45.5"`) and anything else are rejected.
    pub fn coordinates(&self) -> Result<Vec<f64>, RegionError> {
        let items: &[Value] = match self {
            RegionDescriptor::Coordinates(v)
            | RegionDescriptor::Bbox(v)
            | RegionDescriptor::Bbox2d(v) => match v {
                Value::Array(items) => items,
                other => return Err(RegionError::NotASequence(other.to_string())),
            },
            RegionDescriptor::Sequence(items) => items,
            RegionDescriptor::Unrecognized(v) => {
                return Err(RegionError::UnrecognizedShape(v.to_string()))
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(position, v)| {
                as_number(v).ok_or_else(|| RegionError::NonNumeric {
                    position,
                    value: v.to_string(),
                })
            })
            .collect()
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| i as f64),
        _ => None,
    }
}

/// Axis-aligned integer rectangle in image-pixel space.
///
/// Always satisfies `x1 < x2` and `y1 < y2`; [`crate::pipeline::geometry::normalize`]
/// is the only constructor outside tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl NormalizedBox {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Grow the box by `pad` on every side, clamped to `[0, width] × [0, height]`.
    pub fn padded(&self, pad: u32, width: u32, height: u32) -> CropRect {
        let left = self.x1.saturating_sub(pad);
        let top = self.y1.saturating_sub(pad);
        let right = self.x2.saturating_add(pad).min(width);
        let bottom = self.y2.saturating_add(pad).min(height);
        CropRect {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

/// Pixel rectangle actually copied out of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_prefers_coordinates_over_bbox() {
        let d = RegionDescriptor::classify(json!({"bbox": [1, 2, 3, 4], "coordinates": [5, 6, 7, 8]}));
        assert_eq!(d, RegionDescriptor::Coordinates(json!([5, 6, 7, 8])));
    }

    #[test]
    fn integer_strings_are_coordinates() {
        let d = RegionDescriptor::classify(json!({"bbox": ["10", " 20 ", 30, "-4"]}));
        assert_eq!(d.coordinates().unwrap(), vec![10.0, 20.0, 30.0, -4.0]);
    }

    #[test]
    fn fractional_strings_are_rejected() {
        let d = RegionDescriptor::classify(json!({"bbox": [10, "45.5", 30, 40]}));
        assert_eq!(
            d.coordinates().unwrap_err(),
            RegionError::NonNumeric {
                position: 1,
                value: "\"45.5\"".into(),
            }
        );
    }

    #[test]
    fn fractional_json_numbers_are_kept() {
        let d = RegionDescriptor::classify(json!([10.7, 20.2, 30, 40]));
        assert_eq!(d.coordinates().unwrap(), vec![10.7, 20.2, 30.0, 40.0]);
    }

    #[test]
    fn classify_bbox_2d() {
        let d = RegionDescriptor::classify(json!({"bbox_2d": [1, 2, 3, 4], "label": "receipt"}));
        assert!(matches!(d, RegionDescriptor::Bbox2d(_)));
        assert_eq!(d.coordinates().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn classify_bare_sequence() {
        let d = RegionDescriptor::classify(json!([10, 20.5, 30, 40]));
        assert_eq!(d.coordinates().unwrap(), vec![10.0, 20.5, 30.0, 40.0]);
    }

    #[test]
    fn unknown_object_is_unrecognized() {
        let d = RegionDescriptor::classify(json!({"box": [1, 2, 3, 4]}));
        assert!(matches!(
            d.coordinates(),
            Err(RegionError::UnrecognizedShape(_))
        ));
    }

    #[test]
    fn scalar_is_unrecognized() {
        let d = RegionDescriptor::classify(json!("receipt"));
        assert!(matches!(d, RegionDescriptor::Unrecognized(_)));
    }

    #[test]
    fn nested_points_are_non_numeric() {
        let d = RegionDescriptor::classify(json!({"coordinates": [[1, 2], [3, 4], [5, 6], [7, 8]]}));
        assert!(matches!(
            d.coordinates(),
            Err(RegionError::NonNumeric { position: 0, .. })
        ));
    }

    #[test]
    fn coordinate_field_must_be_array() {
        let d = RegionDescriptor::classify(json!({"bbox": "10,10,50,50"}));
        assert!(matches!(d.coordinates(), Err(RegionError::NotASequence(_))));
    }

    #[test]
    fn padded_clamps_at_origin_and_far_edge() {
        let b = NormalizedBox { x1: 0, y1: 0, x2: 50, y2: 50 };
        assert_eq!(
            b.padded(20, 100, 100),
            CropRect { x: 0, y: 0, width: 70, height: 70 }
        );

        let b = NormalizedBox { x1: 60, y1: 70, x2: 100, y2: 95 };
        assert_eq!(
            b.padded(20, 100, 100),
            CropRect { x: 40, y: 50, width: 60, height: 50 }
        );
    }
}
