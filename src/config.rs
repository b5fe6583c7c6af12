use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transcript acquisition strategies, in the order they may be tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Official,
    Auto,
    Subtitle,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): base doubling, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// OpenAI-compatible transcription server
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Split audio above this size before uploading
    pub max_upload_mb: Option<u64>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "small".to_string(),
            api_key: None,
            max_upload_mb: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Caption languages in priority order
    pub languages: Vec<String>,
    /// Extra subtitle languages always requested from the downloader
    pub extra_subtitle_languages: Vec<String>,
    pub strategy_order: Vec<StrategyKind>,
    /// Text-generation model; the provider is inferred from the name
    pub model: String,
    /// Language the summary is written in
    pub summary_language: String,
    pub max_chars: usize,
    pub min_text_chars: usize,
    pub call_timeout_secs: u64,
    pub recognition_timeout_secs: u64,
    pub retry: RetryConfig,
    pub whisper: WhisperConfig,
    pub cookies_path: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: vec!["ko".to_string(), "en".to_string()],
            extra_subtitle_languages: ["en", "en-US", "en-GB", "ko"].iter().map(|s| s.to_string()).collect(),
            strategy_order: vec![StrategyKind::Official, StrategyKind::Auto, StrategyKind::Subtitle],
            model: "gemini-1.5-flash".to_string(),
            summary_language: "Korean".to_string(),
            max_chars: 6000,
            min_text_chars: 20,
            call_timeout_secs: 120,
            recognition_timeout_secs: 3600,
            retry: RetryConfig::default(),
            whisper: WhisperConfig::default(),
            cookies_path: None,
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl Config {
    /// Load config from ~/.config/ytdigest/config.toml if it exists, then apply the environment.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else {
            debug!("No config file found at {}", path.display());
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Overlay values from the environment; `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = get("YTDIGEST_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("YT_COOKIES_PATH") {
            self.cookies_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("WHISPER_MODEL") {
            self.whisper.model = v;
        }
        if let Some(v) = get("WHISPER_BASE_URL") {
            self.whisper.base_url = v;
        }
        if let Some(v) = get("WHISPER_API_KEY") {
            self.whisper.api_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(Error::Config("at least one caption language is required".to_string()));
        }
        if self.max_chars == 0 {
            return Err(Error::Config("max_chars must be greater than 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be greater than 0".to_string()));
        }
        if self.call_timeout_secs == 0 || self.recognition_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be greater than 0".to_string()));
        }
        if self.strategy_order.is_empty() {
            return Err(Error::Config("strategy_order must name at least one strategy".to_string()));
        }
        for (i, kind) in self.strategy_order.iter().enumerate() {
            if self.strategy_order[..i].contains(kind) {
                return Err(Error::Config(format!("strategy {kind:?} listed twice in strategy_order")));
            }
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_timeout_secs)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytdigest")
        .join("config.toml")
}
