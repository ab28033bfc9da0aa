//! Prompts sent to the vision model for receipt localisation.
//!
//! Callers can override both via [`crate::config::ExtractionConfig::system_prompt`]
//! and [`crate::config::ExtractionConfig::user_prompt`]; the constants here are
//! used only when no override is provided. Whatever the model answers is run
//! through [`crate::pipeline::parse::parse_bounding_boxes`], which tolerates
//! any of the JSON shapes models tend to produce.

/// Default system prompt asking for receipt bounding boxes as JSON.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"Detect receipts on the page, there may be multiple. I need you to provide bounding box coordinates for each detected receipt.
For each detected receipt, provide the precise bounding box coordinates that encompass the entire receipt, ensuring the bounding box is also rotated if necessary to perfectly fit around the receipt, regardless of its orientation.

Output:
Must only provide structured json with bounding boxes data!"#;

/// Default user turn accompanying the page image.
pub const DEFAULT_USER_PROMPT: &str = "What is in this image?";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_asks_for_json_boxes() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("bounding box"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("json"));
    }
}
