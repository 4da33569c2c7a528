//! Configuration loaded from the environment

use crate::llm::gemini::DEFAULT_BASE_URL;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Settings for talking to Gemini
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model for text-only prompts
    pub text_model: String,
    /// Model for prompts with an image
    pub vision_model: String,
    pub request_timeout: Duration,
    pub max_output_tokens: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_output_tokens: None,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let request_timeout = match get("CHAT_REQUEST_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "CHAT_REQUEST_TIMEOUT_SECS",
                        value,
                    })
                }
            },
            None => defaults.request_timeout,
        };

        let max_output_tokens = match get("GEMINI_MAX_OUTPUT_TOKENS") {
            Some(value) => Some(value.trim().parse::<u32>().map_err(|_| {
                ConfigError::InvalidValue {
                    var: "GEMINI_MAX_OUTPUT_TOKENS",
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            text_model: get("GEMINI_TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: get("GEMINI_VISION_MODEL").unwrap_or(defaults.vision_model),
            request_timeout,
            max_output_tokens,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}
