//! Configuration for section question answering.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{Result, SectionQaError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::path::PathBuf;

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Price in USD per 1000 prompt tokens, used for cost accounting.
    #[serde(default)]
    pub prompt_cost_per_1k: f64,

    /// Price in USD per 1000 completion tokens, used for cost accounting.
    #[serde(default)]
    pub completion_cost_per_1k: f64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            prompt_cost_per_1k: 0.0,
            completion_cost_per_1k: 0.0,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    prompt_cost_per_1k: Option<f64>,
    completion_cost_per_1k: Option<f64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/section-qa/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SectionQaError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling gaps with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| SectionQaError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(level) = file_config.log_level {
            config.log_level = level;
        }

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(cost) = llm.prompt_cost_per_1k {
                config.llm.prompt_cost_per_1k = cost;
            }
            if let Some(cost) = llm.completion_cost_per_1k {
                config.llm.completion_cost_per_1k = cost;
            }
        }

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(tokens) = env_parse("LLM_MAX_TOKENS") {
            self.llm.max_tokens = tokens;
        }

        if let Some(temp) = env_parse("LLM_TEMPERATURE") {
            self.llm.temperature = temp;
        }

        if let Some(cost) = env_parse("LLM_PROMPT_COST_PER_1K") {
            self.llm.prompt_cost_per_1k = cost;
        }

        if let Some(cost) = env_parse("LLM_COMPLETION_COST_PER_1K") {
            self.llm.completion_cost_per_1k = cost;
        }

        if let Ok(level) = env::var("SECTION_QA_LOG") {
            self.log_level = level;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "section-qa")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(SectionQaError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(SectionQaError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(SectionQaError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.llm.prompt_cost_per_1k < 0.0 || self.llm.completion_cost_per_1k < 0.0 {
            return Err(SectionQaError::Config(
                "Token prices must not be negative.".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
