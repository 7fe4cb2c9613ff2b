//! Configuration parsing and validation.
//!
//! Study Forge is configured via a TOML file (default: `config/sforge.toml`).
//! Every section has defaults, so an empty file (or no file at all) gives a
//! working Gemini setup that reads its key from `GEMINI_API_KEY`.
//!
//! # Example
//!
//! ```toml
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! timeout_secs = 60
//!
//! [budget]
//! max_tokens_per_call = 30000
//!
//! [budget.chars_to_tokens]
//! flashcard = 0.25
//!
//! [orchestrator]
//! max_concurrency = 4
//! chunk_retries = 2
//! ```
//!
//! Pipeline sections reuse the core types directly; see
//! [`BudgetConfig`], [`ConcurrencyConfig`] and [`ValidationPolicy`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use study_forge_core::config::{BudgetConfig, ConcurrencyConfig, PipelineConfig};
use study_forge_core::validate::ValidationPolicy;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/sforge.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub orchestrator: ConcurrencyConfig,
    #[serde(default)]
    pub validation: ValidationPolicy,
}

impl Config {
    /// Pipeline tuning handed to the orchestrator.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            budget: self.budget.clone(),
            validation: self.validation.clone(),
            concurrency: self.orchestrator.clone(),
        }
    }
}

/// Wire protocol of the generative-text service.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// OpenAI-compatible chat completions (OpenAI, Ollama, vLLM, ...).
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL override, e.g. a local Ollama at `http://localhost:11434/v1`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key. Empty string means the
    /// service needs no credential.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            endpoint: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f64 {
    0.4
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    120
}

impl GenerationConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    /// Name of the credential variable, or `None` when no key is needed.
    pub fn api_key_env(&self) -> Option<&str> {
        match self.api_key_env.as_deref() {
            Some("") => None,
            Some(name) => Some(name),
            None => Some(self.provider.default_api_key_env()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate_config(&config)?;
    Ok(config)
}

/// Load `path` when given; otherwise the default path if it exists, or
/// built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    // Validate generation
    let g = &config.generation;
    if g.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }
    if !(0.0..=2.0).contains(&g.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if g.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be > 0");
    }
    if g.connect_timeout_secs == 0 {
        bail!("generation.connect_timeout_secs must be > 0");
    }
    if g.timeout_secs < g.connect_timeout_secs {
        bail!("generation.timeout_secs must be >= generation.connect_timeout_secs");
    }
    if let Some(endpoint) = &g.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            bail!("generation.endpoint must be an http(s) URL, got '{}'", endpoint);
        }
    }

    // Validate budget
    let b = &config.budget;
    if b.max_tokens_per_call == 0 {
        bail!("budget.max_tokens_per_call must be > 0");
    }
    if b.words_to_tokens <= 0.0 {
        bail!("budget.words_to_tokens must be > 0");
    }
    let rate_ok = |r: f64| r > 0.0 && r <= 1.0;
    if !rate_ok(b.default_chars_to_tokens) {
        bail!("budget.default_chars_to_tokens must be in (0.0, 1.0]");
    }
    for (artifact, rate) in &b.chars_to_tokens {
        if !rate_ok(*rate) {
            bail!("budget.chars_to_tokens.{} must be in (0.0, 1.0]", artifact);
        }
    }

    // Validate orchestrator
    if config.orchestrator.max_concurrency == 0 {
        bail!("orchestrator.max_concurrency must be >= 1");
    }

    // Validate validation policy
    if config.validation.blank_marker.trim().is_empty() {
        bail!("validation.blank_marker must not be empty");
    }
    if config.validation.fill_blank_max_answer_words == 0 {
        bail!("validation.fill_blank_max_answer_words must be >= 1");
    }

    Ok(())
}
