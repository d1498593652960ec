// llm-client-rs/src/llm_client.rs
//
// HTTP client for the classification service (OpenAI-compatible API)
//
// Configuration (.env file):
// - LLM_API_URL: chat completions endpoint
// - LLM_API_KEY: bearer token, omitted from requests when unset
// - LLM_MODEL: model name
// - LLM_MAX_RETRIES: maximum retry attempts (default: 3)
// - LLM_INITIAL_RETRY_DELAY_MS: initial backoff delay (default: 1000)
// - LLM_MAX_RETRY_DELAY_MS: maximum backoff delay (default: 30000)
// - LLM_REQUEST_TIMEOUT_MS: per-attempt HTTP timeout (default: 60000)
// - LLM_TEMPERATURE: overrides the per-prompt temperature

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::prompts::Prompt;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

// Distinguishes failures so the retry loop knows which ones are transient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMError {
    // Non-retryable
    InvalidRequest(String),    // 400, 401, 403, 404
    ModelNotAvailable(String), // unknown model, content policy
    // Retryable
    RateLimitExceeded(String), // 429
    ServerError(String),       // 500, 502, 503, 504
    NetworkError(String),      // connect failures, timeouts
    // Other
    ParseError(String),
    UnknownError(String),
}

impl std::fmt::Display for LLMError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            LLMError::RateLimitExceeded(msg) => write!(f, "Rate limit exceeded: {}", msg),
            LLMError::ModelNotAvailable(msg) => write!(f, "Model not available: {}", msg),
            LLMError::ServerError(msg) => write!(f, "Server error: {}", msg),
            LLMError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LLMError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LLMError::UnknownError(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for LLMError {}

/// Whether another attempt may succeed.
pub fn is_retryable(error: &LLMError) -> bool {
    matches!(
        error,
        LLMError::ServerError(_) | LLMError::NetworkError(_) | LLMError::RateLimitExceeded(_)
    )
}

/// The model seam used by the pipeline.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt and return the model's text, trimmed.
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError>;
}

/// Connection and retry settings for [`LLMClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub request_timeout: Duration,
    pub temperature_override: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(30_000),
            request_timeout: Duration::from_millis(60_000),
            temperature_override: None,
        }
    }
}

impl LlmConfig {
    /// Read `LLM_*` variables, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: config_rs::env_opt("LLM_API_URL").unwrap_or(defaults.api_url),
            api_key: config_rs::env_opt("LLM_API_KEY"),
            model: config_rs::env_opt("LLM_MODEL").unwrap_or(defaults.model),
            max_retries: config_rs::env_or("LLM_MAX_RETRIES", defaults.max_retries),
            initial_retry_delay: config_rs::env_duration_ms("LLM_INITIAL_RETRY_DELAY_MS", 1000),
            max_retry_delay: config_rs::env_duration_ms("LLM_MAX_RETRY_DELAY_MS", 30_000),
            request_timeout: config_rs::env_duration_ms("LLM_REQUEST_TIMEOUT_MS", 60_000),
            temperature_override: config_rs::env_opt("LLM_TEMPERATURE")
                .and_then(|raw| raw.parse().ok()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LLMClient {
    client: Client,
    config: LlmConfig,
}

impl LLMClient {
    pub fn new(config: LlmConfig) -> Result<Self, LLMError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LLMError::UnknownError(format!("Failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            log::warn!("LLM_API_KEY is not set; requests will be sent without authorization");
        }
        log::info!(
            "LLM client initialized for {} (model: {})",
            config.api_url,
            config.model
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Exponential backoff with jitter, capped at two minutes in total.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_retry_delay)
            .with_max_interval(self.config.max_retry_delay)
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }

    /// Generate text with retries on transient failures.
    pub async fn generate_text(&self, prompt: &Prompt) -> Result<String, LLMError> {
        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        let request_body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: Some(self.config.temperature_override.unwrap_or(prompt.temperature)),
            max_tokens: Some(MAX_TOKENS),
        };

        log::debug!(
            "Preparing LLM request to {} (model: {})",
            self.config.api_url,
            self.config.model
        );

        loop {
            attempt += 1;
            if attempt > 1 {
                log::info!("Retry attempt {} for LLM request", attempt);
            }

            match self.execute_request(&request_body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !is_retryable(&err) || attempt > self.config.max_retries {
                        log::error!("LLM request failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }

                    match backoff.next_backoff() {
                        Some(delay) => {
                            let jitter = rand::thread_rng().gen_range(0..=200);
                            let delay = delay + Duration::from_millis(jitter);
                            log::warn!("Retryable error: {}. Retrying in {:?}", err, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            log::error!("Exceeded maximum backoff time: {}", err);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn execute_request(
        &self,
        request_body: &ChatCompletionRequest,
    ) -> Result<String, LLMError> {
        let mut request = self.client.post(&self.config.api_url).json(request_body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LLMError::NetworkError(format!("Request timed out: {}", err))
            } else if err.is_connect() {
                LLMError::NetworkError(format!("Connection failed: {}", err))
            } else {
                LLMError::NetworkError(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LLMError::ParseError(format!("Failed to parse response: {}", err)))?;

        if let Some(usage) = &data.usage {
            log::debug!("LLM request completed. Used {} tokens", usage.total_tokens);
        }

        data.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| LLMError::ParseError("No choices returned in response".to_string()))
    }
}

fn classify_status(status: StatusCode, text: String) -> LLMError {
    match status.as_u16() {
        400 if text.contains("model") => {
            LLMError::ModelNotAvailable(format!("Bad request: {}", text))
        }
        400 => LLMError::InvalidRequest(format!("Bad request: {}", text)),
        401 => LLMError::InvalidRequest(format!("Unauthorized: {}", text)),
        403 => LLMError::InvalidRequest(format!("Forbidden: {}", text)),
        404 => LLMError::ModelNotAvailable(format!("Not found: {}", text)),
        429 => LLMError::RateLimitExceeded(text),
        500 | 502 | 503 | 504 => LLMError::ServerError(format!("({}) {}", status, text)),
        _ => LLMError::UnknownError(format!("({}) {}", status, text)),
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError> {
        self.generate_text(prompt).await
    }
}
