//! Configuration types for a receipt-extraction run.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The CLI maps its flags onto the builder; library
//! callers set only the knobs they care about and keep the documented defaults
//! for the rest.

use crate::error::ReceiptError;
use crate::pipeline::extract::RECEIPT_PADDING;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.venice.ai/api/v1";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "qwen-2.5-vl";

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "LLM_VENICE_KEY";

/// Configuration for one receipt-extraction run.
///
/// # Example
/// ```rust
/// use receipt_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .contrast_factor(1.5)
///     .api_key("sk-test")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Folder scanned for `*.pdf` documents. Default: `input`.
    pub input_dir: PathBuf,

    /// Folder receiving rasterised pages, and scanned for page images. Default: `output/pages`.
    pub pages_dir: PathBuf,

    /// Folder receiving cropped receipts. Default: `output/receipts`.
    pub receipts_dir: PathBuf,

    /// Skip rasterisation and reuse the images already in `pages_dir`. Default: false.
    pub skip_rasterize: bool,

    /// Rendering DPI. Range: 72–600. Default: 300.
    ///
    /// Receipts are small print; 300 DPI keeps totals and line items legible
    /// in the final crops.
    pub dpi: u32,

    /// Contrast enhancement applied to rendered pages. 1.0 disables it. Default: 2.0.
    pub contrast_factor: f32,

    /// Optional cap on the longest rendered edge, in pixels. Default: none.
    pub max_rendered_pixels: Option<u32>,

    /// File format for rasterised pages. Default: PNG.
    pub page_format: PageFormat,

    /// JPEG quality used when `page_format` is JPEG. Default: 94.
    pub jpeg_quality: u8,

    /// Margin added on every side of a detected box before cropping. Default: 20.
    pub padding: u32,

    /// Vision model identifier. Default: `qwen-2.5-vl`.
    pub model: String,

    /// Base URL of the OpenAI-compatible endpoint. Default: Venice.ai.
    pub api_base: String,

    /// Bearer credential for the OpenAI-compatible endpoint.
    pub api_key: Option<String>,

    /// Headers sent with every request to the OpenAI-compatible endpoint.
    pub extra_headers: Vec<(String, String)>,

    /// edgequake-llm provider name (e.g. "openai", "gemini"). When set the
    /// request goes through that provider instead of `api_base`.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Custom user prompt. If None, uses [`crate::prompts::DEFAULT_USER_PROMPT`].
    pub user_prompt: Option<String>,

    /// Sampling temperature. None leaves the server default in place.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate per page. None leaves the server default.
    pub max_tokens: Option<usize>,

    /// Retry attempts on a failed model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: none (the HTTP client decides).
    pub api_timeout_secs: Option<u64>,

    /// Pages processed at the same time. 1 processes pages strictly in order. Default: 1.
    pub concurrency: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            pages_dir: PathBuf::from("output/pages"),
            receipts_dir: PathBuf::from("output/receipts"),
            skip_rasterize: false,
            dpi: 300,
            contrast_factor: 2.0,
            max_rendered_pixels: None,
            page_format: PageFormat::default(),
            jpeg_quality: 94,
            padding: RECEIPT_PADDING,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            extra_headers: vec![("x-venice-version".to_string(), "2024-10-23".to_string())],
            provider_name: None,
            provider: None,
            system_prompt: None,
            user_prompt: None,
            temperature: None,
            max_tokens: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: None,
            concurrency: 1,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("input_dir", &self.input_dir)
            .field("pages_dir", &self.pages_dir)
            .field("receipts_dir", &self.receipts_dir)
            .field("skip_rasterize", &self.skip_rasterize)
            .field("dpi", &self.dpi)
            .field("contrast_factor", &self.contrast_factor)
            .field("page_format", &self.page_format)
            .field("padding", &self.padding)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn pages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pages_dir = dir.into();
        self
    }

    pub fn receipts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.receipts_dir = dir.into();
        self
    }

    pub fn skip_rasterize(mut self, v: bool) -> Self {
        self.config.skip_rasterize = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn contrast_factor(mut self, factor: f32) -> Self {
        self.config.contrast_factor = factor.max(0.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = Some(px.max(100));
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.page_format = format;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn padding(mut self, px: u32) -> Self {
        self.config.padding = px;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ReceiptError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ReceiptError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !c.contrast_factor.is_finite() || c.contrast_factor < 0.0 {
            return Err(ReceiptError::InvalidConfig(format!(
                "Contrast factor must be a non-negative number, got {}",
                c.contrast_factor
            )));
        }
        if c.concurrency == 0 {
            return Err(ReceiptError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.model.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image format used for rasterised pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    /// Lossless; recommended for box detection. (default)
    #[default]
    Png,
    /// Smaller files, encoded at `jpeg_quality`.
    Jpeg,
}

impl PageFormat {
    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            PageFormat::Png => "png",
            PageFormat::Jpeg => "jpg",
        }
    }
}
