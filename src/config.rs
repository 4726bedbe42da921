//! Configuration
//!
//! Per-tenant investigation settings, loaded from a toml file with
//! environment-variable overrides.
//!
//! Loading order (priority from highest to lowest):
//! 1. Environment variables (prefixed with APP_)
//! 2. Configuration file (config.toml)
//! 3. Default values

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::investigation::OrchestratorConfig;
use crate::safety::CircuitBreakerConfig;
use crate::services::context::ContextEngineConfig;
use crate::services::llm::{LlmProvider, DEFAULT_PASS_THRESHOLD};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub context: ContextEngineConfig,
    pub llm: LlmConfig,
    pub judge: JudgeConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Model provider settings for the investigation client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model_name: String,
    /// Usually injected via APP_LLM_API_KEY rather than written to disk
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o".to_string(),
            api_key: String::new(),
            max_tokens: 4096,
            temperature: 0.3,
            timeout_seconds: 60,
        }
    }
}

impl LlmConfig {
    pub fn to_provider(&self) -> LlmProvider {
        LlmProvider {
            api_base: self.api_base.clone(),
            model_name: self.model_name.clone(),
            api_key: self.api_key.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

/// Quality-judge settings; the judge may run on a different model
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub pass_threshold: f64,
    /// Empty means: use the main LLM model
    pub model_name: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self { pass_threshold: DEFAULT_PASS_THRESHOLD, model_name: String::new() }
    }
}

impl JudgeConfig {
    pub fn to_provider(&self, llm: &LlmConfig) -> LlmProvider {
        let mut provider = llm.to_provider();
        if !self.model_name.is_empty() {
            provider.model_name = self.model_name.clone();
        }
        provider
    }
}

/// Durable event-store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/investigations.db".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Load configuration from an optional file path plus env overrides
    pub fn load(path: Option<&str>) -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config_path = path.map(str::to_string).or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::debug!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<String> {
        ["config.toml", "conf/config.toml"]
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {path}: {e}"))?;
        tracing::info!("configuration loaded from {}", path);
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_LLM_API_BASE / APP_LLM_MODEL / APP_LLM_API_KEY
    /// - APP_JUDGE_MODEL / APP_JUDGE_PASS_THRESHOLD
    /// - APP_STORE_URL
    /// - APP_LOG_LEVEL
    fn apply_env_overrides(&mut self) {
        if let Ok(api_base) = std::env::var("APP_LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(model) = std::env::var("APP_LLM_MODEL") {
            self.llm.model_name = model;
        }
        if let Ok(api_key) = std::env::var("APP_LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = std::env::var("APP_JUDGE_MODEL") {
            self.judge.model_name = model;
        }
        if let Ok(threshold) = std::env::var("APP_JUDGE_PASS_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                self.judge.pass_threshold = threshold;
            }
        }
        if let Ok(url) = std::env::var("APP_STORE_URL") {
            self.store.url = url;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if !(0.0..=1.0).contains(&self.judge.pass_threshold) {
            anyhow::bail!(
                "judge.pass_threshold must be within [0, 1], got {}",
                self.judge.pass_threshold
            );
        }
        if self.orchestrator.max_hypotheses == 0 {
            anyhow::bail!("orchestrator.max_hypotheses must be at least 1");
        }
        if self.circuit_breaker.max_total_queries == 0 {
            anyhow::bail!("circuit_breaker.max_total_queries must be at least 1");
        }
        Ok(())
    }
}
