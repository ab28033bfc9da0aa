//! VLM interaction: send a page image, get back free-form box text.
//!
//! Two backends sit behind [`VisionClient`]:
//!
//! * **Compatible** — a plain OpenAI-style `chat/completions` endpoint
//!   (Venice.ai by default) reached with reqwest and a bearer key.
//! * **Provider** — any [`LLMProvider`] from edgequake-llm, injected by the
//!   caller or built by name through [`ProviderFactory`].
//!
//! Nothing here interprets the answer; that is
//! [`super::parse::parse_bounding_boxes`]'s job.
//!
//! ## Retry Strategy
//!
//! Failed calls are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`, saturating): with 500 ms base and 2
//! retries the wait sequence is 500 ms → 1 s.

use super::encode::data_url;
use crate::config::{ExtractionConfig, API_KEY_ENV};
use crate::error::{PageError, ReceiptError};
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One vision request: a page image plus its prompts.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub image: ImageData,
}

impl VisionRequest {
    /// Request for `image` using the configured (or default) prompts.
    pub fn for_page(image: ImageData, config: &ExtractionConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let prompt = config
            .user_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string());
        Self {
            system_prompt: Some(system_prompt).filter(|s| !s.trim().is_empty()),
            prompt,
            image,
        }
    }
}

// ── OpenAI-compatible wire types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RequestMessage {
    System { content: String },
    User { content: Vec<ContentPart> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Build the chat-completions body: system turn first, then text + image.
pub fn build_chat_request(
    model: &str,
    request: &VisionRequest,
    config: &ExtractionConfig,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(ref system) = request.system_prompt {
        messages.push(RequestMessage::System {
            content: system.clone(),
        });
    }
    messages.push(RequestMessage::User {
        content: vec![
            ContentPart::Text {
                text: request.prompt.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(&request.image),
                },
            },
        ],
    });
    debug!("Created request for model {}", model);

    ChatRequest {
        model: model.to_string(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct CompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CompatibleClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        headers: &[(String, String)],
        timeout_secs: Option<u64>,
    ) -> Result<Self, ReceiptError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ReceiptError::InvalidConfig(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ReceiptError::InvalidConfig(format!("header value '{value}': {e}")))?;
            default_headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(default_headers);
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| ReceiptError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn chat(&self, body: &ChatRequest) -> Result<String, String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {}", detail.trim()));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| e.to_string())?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| "response contained no choices".to_string())
    }

    /// Model ids advertised by `GET {base}/models`.
    pub async fn list_models(&self) -> Result<Vec<String>, ReceiptError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ReceiptError::ModelApiError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReceiptError::ModelApiError {
                message: format!("listing models failed: HTTP {status}"),
            });
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ReceiptError::ModelApiError {
                message: e.to_string(),
            })?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// The backend answering vision requests.
#[derive(Clone)]
pub enum VisionClient {
    Compatible {
        client: CompatibleClient,
        model: String,
    },
    Provider(Arc<dyn LLMProvider>),
}

impl std::fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionClient::Compatible { client, model } => f
                .debug_struct("Compatible")
                .field("base_url", &client.base_url)
                .field("model", model)
                .finish(),
            VisionClient::Provider(_) => f.write_str("Provider(<dyn LLMProvider>)"),
        }
    }
}

impl VisionClient {
    /// Resolve the backend, from most-specific to least-specific.
    ///
    /// 1. **Pre-built provider** (`config.provider`), used as-is.
    /// 2. **Named provider** (`config.provider_name`) built with
    ///    [`ProviderFactory::create_llm_provider`] for `config.model`; the
    ///    provider reads its own API key variable.
    /// 3. **OpenAI-compatible endpoint** at `config.api_base`, authenticated
    ///    with `config.api_key` or, failing that, `LLM_VENICE_KEY`.
    ///
    /// A missing credential is a fatal error, reported before any page work.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ReceiptError> {
        if let Some(ref provider) = config.provider {
            return Ok(VisionClient::Provider(Arc::clone(provider)));
        }

        if let Some(ref name) = config.provider_name {
            let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(
                |e| ReceiptError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                },
            )?;
            return Ok(VisionClient::Provider(provider));
        }

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ReceiptError::MissingCredential {
                var: API_KEY_ENV.to_string(),
            })?;

        let client = CompatibleClient::new(
            &config.api_base,
            &api_key,
            &config.extra_headers,
            config.api_timeout_secs,
        )?;
        Ok(VisionClient::Compatible {
            client,
            model: config.model.clone(),
        })
    }

    /// Send one request and return the raw answer text.
    pub async fn complete(
        &self,
        request: &VisionRequest,
        config: &ExtractionConfig,
    ) -> Result<String, String> {
        match self {
            VisionClient::Compatible { client, model } => {
                client.chat(&build_chat_request(model, request, config)).await
            }
            VisionClient::Provider(provider) => {
                let mut messages = Vec::with_capacity(2);
                if let Some(ref system) = request.system_prompt {
                    messages.push(ChatMessage::system(system));
                }
                messages.push(ChatMessage::user_with_images(
                    &request.prompt,
                    vec![request.image.clone()],
                ));
                let options = CompletionOptions {
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                    ..Default::default()
                };
                provider
                    .chat(&messages, Some(&options))
                    .await
                    .map(|r| r.content)
                    .map_err(|e| e.to_string())
            }
        }
    }

    /// Model ids available on the OpenAI-compatible endpoint.
    pub async fn list_models(&self) -> Result<Vec<String>, ReceiptError> {
        match self {
            VisionClient::Compatible { client, .. } => client.list_models().await,
            VisionClient::Provider(_) => Err(ReceiptError::InvalidConfig(
                "model listing is only available for the OpenAI-compatible endpoint".into(),
            )),
        }
    }
}

/// Delay before retry number `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// A successful model answer for one page.
#[derive(Debug, Clone)]
pub struct ModelAnswer {
    pub text: String,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Ask the model for receipt boxes on one page, retrying on failure.
///
/// Never panics or propagates upward: the caller gets a [`PageError`] and
/// moves on to the next page.
pub async fn request_boxes(
    client: &VisionClient,
    page: &str,
    image: ImageData,
    config: &ExtractionConfig,
) -> Result<ModelAnswer, PageError> {
    let start = Instant::now();
    let request = VisionRequest::for_page(image, config);
    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                page, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = client.complete(&request, config);
        let result = match config.api_timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), call)
                .await
                .unwrap_or_else(|_| Err(format!("timed out after {secs}s"))),
            None => call.await,
        };

        match result {
            Ok(text) => {
                debug!("{}: model answered with {} chars", page, text.len());
                return Ok(ModelAnswer {
                    text,
                    retries: attempt,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                warn!("{}: attempt {} failed — {}", page, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(PageError::ModelFailed {
        page: page.to_string(),
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_image_bytes;

    fn request(system: Option<&str>) -> VisionRequest {
        VisionRequest {
            system_prompt: system.map(str::to_string),
            prompt: "What is in this image?".into(),
            image: encode_image_bytes(b"\x89PNG\r\n\x1a\nfake"),
        }
    }

    #[test]
    fn system_message_comes_first() {
        let config = ExtractionConfig::default();
        let body = build_chat_request("qwen-2.5-vl", &request(Some("find receipts")), &config);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "qwen-2.5-vl");
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "find receipts");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][0]["text"], "What is in this image?");
        assert_eq!(messages[1]["content"][1]["type"], "image_url");
        let url = messages[1]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn no_system_message_without_system_prompt() {
        let config = ExtractionConfig::default();
        let body = build_chat_request("m", &request(None), &config);
        let json = serde_json::to_value(&body).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn unset_sampling_options_are_omitted() {
        let config = ExtractionConfig::default();
        let json = serde_json::to_value(build_chat_request("m", &request(None), &config)).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());

        let config = ExtractionConfig::builder()
            .temperature(0.0)
            .max_tokens(512)
            .build()
            .unwrap();
        let json = serde_json::to_value(build_chat_request("m", &request(None), &config)).unwrap();
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["max_tokens"], 512);
    }

    #[test]
    fn default_prompts_used_for_page_request() {
        let config = ExtractionConfig::default();
        let req = VisionRequest::for_page(encode_image_bytes(b"x"), &config);
        assert_eq!(req.prompt, DEFAULT_USER_PROMPT);
        assert_eq!(req.system_prompt.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
    }

    #[test]
    fn explicit_key_builds_compatible_client() {
        let config = ExtractionConfig::builder()
            .api_key("sk-test")
            .api_base("http://localhost:9/v1/")
            .build()
            .unwrap();
        let client = VisionClient::from_config(&config).unwrap();
        match client {
            VisionClient::Compatible { client, model } => {
                assert_eq!(client.base_url, "http://localhost:9/v1");
                assert_eq!(model, "qwen-2.5-vl");
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
    }

    #[test]
    fn backoff_saturates_on_many_retries() {
        assert_eq!(backoff_ms(0, 65), 0);
        assert_eq!(backoff_ms(0, u32::MAX), 0);
        assert_eq!(backoff_ms(500, 65), u64::MAX);
        assert_eq!(backoff_ms(1, 64), 1 << 63);
    }

    #[test]
    fn invalid_header_is_a_config_error() {
        let err = CompatibleClient::new(
            "http://localhost",
            "k",
            &[("bad header".into(), "v".into())],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_exhausts_retries() {
        let config = ExtractionConfig::builder()
            .api_key("sk-test")
            .api_base("http://127.0.0.1:9/v1")
            .max_retries(1)
            .retry_backoff_ms(1)
            .api_timeout_secs(5)
            .build()
            .unwrap();
        let client = VisionClient::from_config(&config).unwrap();
        let err = request_boxes(&client, "p.png", encode_image_bytes(b"x"), &config)
            .await
            .unwrap_err();
        match err {
            PageError::ModelFailed { page, retries, .. } => {
                assert_eq!(page, "p.png");
                assert_eq!(retries, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
