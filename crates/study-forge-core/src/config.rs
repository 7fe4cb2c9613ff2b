//! Pipeline tuning parameters, decoupled from application config.
//!
//! The application loads these from its TOML file and hands a
//! [`PipelineConfig`] to the orchestrator at construction time.

use serde::Deserialize;
use std::collections::HashMap;

use crate::estimate::{TokenEstimator, DEFAULT_CHARS_TO_TOKENS, DEFAULT_WORDS_TO_TOKENS};
use crate::models::ArtifactType;
use crate::validate::ValidationPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub validation: ValidationPolicy,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Per-call size budget and token-rate heuristics.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_tokens_per_call")]
    pub max_tokens_per_call: usize,
    #[serde(default = "default_words_to_tokens")]
    pub words_to_tokens: f64,
    #[serde(default = "default_chars_to_tokens")]
    pub default_chars_to_tokens: f64,
    /// Per-artifact-type overrides of the character rate.
    #[serde(default)]
    pub chars_to_tokens: HashMap<ArtifactType, f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_call: default_max_tokens_per_call(),
            words_to_tokens: default_words_to_tokens(),
            default_chars_to_tokens: default_chars_to_tokens(),
            chars_to_tokens: HashMap::new(),
        }
    }
}

fn default_max_tokens_per_call() -> usize {
    30_000
}
fn default_words_to_tokens() -> f64 {
    DEFAULT_WORDS_TO_TOKENS
}
fn default_chars_to_tokens() -> f64 {
    DEFAULT_CHARS_TO_TOKENS
}

impl BudgetConfig {
    pub fn chars_to_tokens_for(&self, artifact: ArtifactType) -> f64 {
        self.chars_to_tokens
            .get(&artifact)
            .copied()
            .unwrap_or(self.default_chars_to_tokens)
    }

    pub fn estimator_for(&self, artifact: ArtifactType) -> TokenEstimator {
        TokenEstimator::new(self.words_to_tokens, self.chars_to_tokens_for(artifact))
    }

    /// Maximum chunk size in characters for `artifact`.
    pub fn chunk_char_budget(&self, artifact: ArtifactType) -> usize {
        self.estimator_for(artifact)
            .chars_for_tokens(self.max_tokens_per_call)
    }
}

/// Fan-out limits and orchestrator-owned retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Extra attempts for retryable chunk failures. `0` disables retries.
    #[serde(default)]
    pub chunk_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            chunk_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_type_rate_override() {
        let mut budget = BudgetConfig::default();
        budget.chars_to_tokens.insert(ArtifactType::Flashcard, 0.25);
        assert_eq!(budget.chars_to_tokens_for(ArtifactType::Flashcard), 0.25);
        assert_eq!(budget.chars_to_tokens_for(ArtifactType::QuizQuestion), 0.33);
        assert_eq!(budget.chunk_char_budget(ArtifactType::Flashcard), 120_000);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"budget": {"max_tokens_per_call": 1000, "chars_to_tokens": {"quiz_question": 0.5}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.budget.max_tokens_per_call, 1000);
        assert_eq!(cfg.budget.chunk_char_budget(ArtifactType::QuizQuestion), 2000);
        assert_eq!(cfg.concurrency.max_concurrency, 4);
        assert_eq!(cfg.validation.blank_marker, "_____");
    }
}
