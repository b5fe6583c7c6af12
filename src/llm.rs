use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::Config;
use crate::build_http_client;
use crate::error::{Error, Result};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MAX_OUTPUT_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.2;

/// Outcome classification for a failed generation call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Rate limits, server errors, timeouts: worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Auth, malformed request, unusable response: retrying will not help.
    #[error("{0}")]
    Fatal(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }

    fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let msg = format!("{provider} API returned {status}: {body}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            GenerationError::Transient(msg)
        } else {
            GenerationError::Fatal(msg)
        }
    }

    fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        let msg = format!("{provider} request failed: {err}");
        if err.is_decode() || err.is_builder() {
            GenerationError::Fatal(msg)
        } else {
            GenerationError::Transient(msg)
        }
    }
}

/// A remote service that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
    fn name(&self) -> &str;
}

/// Pick a provider from the model name and build its client.
pub fn create_generator(config: &Config) -> Result<Box<dyn TextGenerator>> {
    let model = config.model.as_str();
    let timeout = Duration::from_secs(config.call_timeout_secs);

    let missing = |var: &str| Error::Config(format!("{var} not set (required for model {model})"));

    let generator: Box<dyn TextGenerator> = if is_anthropic_model(model) {
        let key = config.anthropic_api_key.clone().ok_or_else(|| missing("ANTHROPIC_API_KEY"))?;
        Box::new(AnthropicClient::new(key, model, timeout)?)
    } else if is_gemini_model(model) {
        let key = config.gemini_api_key.clone().ok_or_else(|| missing("GEMINI_API_KEY"))?;
        Box::new(GeminiClient::new(key, model, timeout)?)
    } else {
        let key = config.openai_api_key.clone().ok_or_else(|| missing("OPENAI_API_KEY"))?;
        Box::new(OpenAiClient::new(key, model, timeout)?)
    };

    debug!("Using {} for model {model}", generator.name());
    Ok(generator)
}

fn is_anthropic_model(model: &str) -> bool {
    model.starts_with("claude")
}

fn is_gemini_model(model: &str) -> bool {
    model.starts_with("gemini")
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    build_http_client(reqwest::Client::builder().timeout(timeout))
}

async fn read_json(provider: &str, resp: reqwest::Response) -> std::result::Result<serde_json::Value, GenerationError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GenerationError::from_status(provider, status, &body));
    }
    resp.json().await.map_err(|e| GenerationError::from_reqwest(provider, e))
}

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        debug!("Generating via Anthropic API with model {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("Anthropic", e))?;

        let json = read_json("Anthropic", resp).await?;
        extract_anthropic_text(&json)
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}

fn extract_anthropic_text(json: &serde_json::Value) -> std::result::Result<String, GenerationError> {
    if let Some(content) = json.get("content").and_then(|c| c.as_array()) {
        let text: String = content
            .iter()
            .filter_map(|block| {
                if block.get("type")?.as_str()? == "text" {
                    block.get("text")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");
        if !text.trim().is_empty() {
            return Ok(text.trim().to_string());
        }
    }
    Err(GenerationError::Fatal("unexpected Anthropic API response format".to_string()))
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        debug!("Generating via OpenAI API with model {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("OpenAI", e))?;

        let json = read_json("OpenAI", resp).await?;
        extract_openai_text(&json)
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

fn extract_openai_text(json: &serde_json::Value) -> std::result::Result<String, GenerationError> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
    {
        return Ok(text.trim().to_string());
    }
    Err(GenerationError::Fatal("unexpected OpenAI API response format".to_string()))
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        debug!("Generating via Gemini API with model {}", self.model);

        let body = serde_json::json!({
            "contents": [
                {
                    "parts": [{ "text": prompt }]
                }
            ],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        });

        let resp = self
            .client
            .post(format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("Gemini", e))?;

        let json = read_json("Gemini", resp).await?;
        extract_gemini_text(&json)
    }

    fn name(&self) -> &str {
        "Gemini"
    }
}

fn extract_gemini_text(json: &serde_json::Value) -> std::result::Result<String, GenerationError> {
    let text: String = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::Fatal("unexpected Gemini API response format".to_string()));
    }
    Ok(text.trim().to_string())
}
