//! Bounding-box parsing: free-form model text → [`RegionDescriptor`]s.
//!
//! Vision models are asked for "structured json", and they mostly comply, but
//! the envelope varies from call to call: a ```` ```json ```` fence around the
//! payload, a bare array, `{"bounding_boxes": [...]}`, `{"receipts": [...]}`,
//! or some other key holding the list. Every failure mode degrades to an empty
//! result; "no boxes on this page" is a normal outcome for the orchestrator.

use crate::region::RegionDescriptor;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, warn};

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").unwrap());

/// Extract region descriptors from a model response.
///
/// Lookup order for an object payload: `bounding_boxes`, then `receipts`,
/// then the first non-empty array among the values in document order.
pub fn parse_bounding_boxes(response: &str) -> Vec<RegionDescriptor> {
    parse_payload(response)
        .into_iter()
        .map(RegionDescriptor::classify)
        .collect()
}

/// The JSON payload of a response: fenced block contents if present, else the whole text.
pub fn payload_text(response: &str) -> &str {
    match RE_JSON_FENCE.captures(response).and_then(|c| c.get(1)) {
        Some(m) => {
            debug!("Found JSON in markdown code block");
            m.as_str().trim()
        }
        None => {
            debug!("No JSON code block found, parsing entire response");
            response.trim()
        }
    }
}

fn parse_payload(response: &str) -> Vec<Value> {
    let payload = payload_text(response);

    let data: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to parse JSON: {}", e);
            debug!("JSON string that failed to parse: {}", payload);
            return Vec::new();
        }
    };

    match data {
        Value::Array(items) => {
            debug!("Found {} bounding boxes in list format", items.len());
            items
        }
        Value::Object(mut map) => {
            for key in ["bounding_boxes", "receipts"] {
                if let Some(v) = map.remove(key) {
                    return match v {
                        Value::Array(items) => {
                            debug!("Found {} bounding boxes under '{}'", items.len(), key);
                            items
                        }
                        other => {
                            warn!("'{}' is not a list: {}", key, other);
                            Vec::new()
                        }
                    };
                }
            }

            for (key, value) in map {
                if let Value::Array(items) = value {
                    if !items.is_empty() {
                        debug!("Found potential bounding boxes under '{}'", key);
                        return items;
                    }
                }
            }

            warn!("No recognizable bounding box structure found in JSON");
            Vec::new()
        }
        _ => {
            warn!("Response is not a JSON object or array");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_block_is_preferred() {
        let text = "Here are the receipts:\n```json\n[{\"bbox\": [1, 2, 3, 4]}]\n```\nHope that helps!";
        let boxes = parse_bounding_boxes(text);
        assert_eq!(boxes, vec![RegionDescriptor::Bbox(json!([1, 2, 3, 4]))]);
    }

    #[test]
    fn whole_response_when_no_fence() {
        let boxes = parse_bounding_boxes("  [[10, 10, 50, 50], [60, 60, 90, 90]]\n");
        assert_eq!(boxes.len(), 2);
        assert!(matches!(boxes[0], RegionDescriptor::Sequence(_)));
    }

    #[test]
    fn bounding_boxes_key_wins_over_receipts() {
        let text = r#"{"receipts": [[0, 0, 1, 1]], "bounding_boxes": [[5, 5, 9, 9], [1, 1, 2, 2]]}"#;
        let boxes = parse_bounding_boxes(text);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].coordinates().unwrap(), vec![5.0, 5.0, 9.0, 9.0]);
    }

    #[test]
    fn receipts_key_used_when_no_bounding_boxes() {
        let text = r#"{"count": 1, "receipts": [{"coordinates": [1, 2, 3, 4]}]}"#;
        let boxes = parse_bounding_boxes(text);
        assert_eq!(boxes, vec![RegionDescriptor::Coordinates(json!([1, 2, 3, 4]))]);
    }

    #[test]
    fn first_non_empty_list_in_document_order() {
        let text = r#"{"notes": [], "zz_detected": [[1, 1, 5, 5]], "aa_other": [[2, 2, 6, 6]]}"#;
        let boxes = parse_bounding_boxes(text);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].coordinates().unwrap(), vec![1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn object_without_lists_is_empty() {
        assert!(parse_bounding_boxes(r#"{"status": "no receipts"}"#).is_empty());
    }

    #[test]
    fn preferred_key_with_non_list_value_is_empty() {
        let text = r#"{"bounding_boxes": "none", "other": [[1, 1, 2, 2]]}"#;
        assert!(parse_bounding_boxes(text).is_empty());
    }

    #[test]
    fn malformed_json_is_empty() {
        assert!(parse_bounding_boxes("```json\n[{\"bbox\": [1, 2,\n```").is_empty());
        assert!(parse_bounding_boxes("I could not find any receipts.").is_empty());
        assert!(parse_bounding_boxes("").is_empty());
    }

    #[test]
    fn scalar_payload_is_empty() {
        assert!(parse_bounding_boxes("42").is_empty());
        assert!(parse_bounding_boxes("\"receipt\"").is_empty());
    }

    #[test]
    fn untagged_fence_is_not_unwrapped() {
        // Only ```json fences are recognised; anything else is parsed whole and fails.
        assert!(parse_bounding_boxes("```\n[[1, 2, 3, 4]]\n```").is_empty());
    }

    #[test]
    fn payload_text_trims_fence_contents() {
        assert_eq!(payload_text("```json   \n  [1]  \n```"), "[1]");
        assert_eq!(payload_text("  {}  "), "{}");
    }
}
