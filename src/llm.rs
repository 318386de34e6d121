//! LLM collaborator contract (spec.md §6). One call, `generate`; callers own
//! retry policy (spec.md §5: up to 2 retries on retryable failures). Shaped
//! like `captcha.rs`'s `Captcha` trait and `post_fetcher.rs`'s `PostFetcher`
//! trait — a single-method `Send + Sync` trait with a production `reqwest`
//! impl and a colocated `#[cfg(test)] test_utils` fake.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::errors::LlmError;

/// Optional response shape hint, mirroring the source contract's
/// `application/json` mime-type option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            response_format: ResponseFormat::Text,
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, config: &LlmConfig) -> Result<String, LlmError>;
}

/// Runs `client.generate` with up to `max_retries` additional attempts when
/// the failure is classified retryable (spec.md §5: "up to 2 retries on
/// transient network/5xx errors"). Terminal failures return immediately.
pub async fn generate_with_retry(
    client: &dyn LlmClient,
    prompt: &str,
    config: &LlmConfig,
    max_retries: u32,
) -> Result<String, LlmError> {
    let mut attempt = 0;
    loop {
        match client.generate(prompt, config).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::debug!(attempt, error = %err, "retrying LLM call");
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// GeminiLlmClient — production implementation
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiLlmClient {
    api_key: String,
    model: String,
    http_client: reqwest::Client,
}

impl GeminiLlmClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(serde::Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[async_trait::async_trait]
impl LlmClient for GeminiLlmClient {
    async fn generate(&self, prompt: &str, config: &LlmConfig) -> Result<String, LlmError> {
        let url = format!("{GEMINI_API_BASE}/{}:generateContent?key={}", self.model, self.api_key);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
                response_mime_type: match config.response_format {
                    ResponseFormat::Json => Some("application/json"),
                    ResponseFormat::Text => None,
                },
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(120))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if status.is_server_error() {
            return Err(LlmError::ServiceUnavailable(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(LlmError::Terminal(format!("status {status}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Terminal(format!("response parse failed: {e}")))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| LlmError::Terminal("no candidates returned".to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::ServiceUnavailable(err.to_string())
    } else {
        LlmError::Terminal(err.to_string())
    }
}

/// Loads `GEMINI_API_KEY`/`GEMINI_MODEL` the way `digest_mailer.rs` loads
/// `EMAIL_FROM` once at construction time.
pub fn client_from_env() -> Result<GeminiLlmClient> {
    let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?;
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());
    Ok(GeminiLlmClient::new(api_key, model))
}

// ============================================================================
// Test utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use std::sync::Mutex;

    /// Canned-response fake; each call pops the next configured response.
    pub(crate) struct FakeLlmClient {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakeLlmClient {
        pub(crate) fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn ok(text: impl Into<String>) -> Self {
            Self::with_responses(vec![Ok(text.into())])
        }

        pub(crate) fn failing(err: LlmError) -> Self {
            Self::with_responses(vec![Err(err)])
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for FakeLlmClient {
        async fn generate(&self, prompt: &str, _config: &LlmConfig) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Terminal("no more canned responses".to_string())))
        }
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts_on_retryable_error() {
        let client = FakeLlmClient::with_responses(vec![
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
        ]);
        let result = generate_with_retry(&client, "hi", &LlmConfig::default(), 2).await;
        assert!(result.is_err());
        assert_eq!(client.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failure() {
        let client = FakeLlmClient::with_responses(vec![Err(LlmError::Timeout), Ok("hello".to_string())]);
        let result = generate_with_retry(&client, "hi", &LlmConfig::default(), 2).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let client = FakeLlmClient::with_responses(vec![Err(LlmError::Terminal("bad request".to_string()))]);
        let result = generate_with_retry(&client, "hi", &LlmConfig::default(), 2).await;
        assert!(result.is_err());
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }
}
