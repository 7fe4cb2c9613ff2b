//! Heuristic token estimation.
//!
//! The generative-text service bills and limits by tokens, but we never see
//! its tokenizer. Two cheap estimates are computed and the larger one wins:
//!
//! ```text
//! by_words = ceil(word_count × words_to_tokens)     (default 1.3)
//! by_chars = ceil(char_count × chars_to_tokens)     (default 0.33)
//! estimate = max(by_words, by_chars)
//! ```
//!
//! Taking the maximum errs on the side of over-estimating, which routes
//! borderline inputs to the chunked path instead of overflowing the limit.

/// Default tokens-per-word multiplier.
pub const DEFAULT_WORDS_TO_TOKENS: f64 = 1.3;

/// Default tokens-per-character rate.
pub const DEFAULT_CHARS_TO_TOKENS: f64 = 0.33;

/// Pure, side-effect-free token estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    words_to_tokens: f64,
    chars_to_tokens: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS_TO_TOKENS, DEFAULT_CHARS_TO_TOKENS)
    }
}

impl TokenEstimator {
    pub fn new(words_to_tokens: f64, chars_to_tokens: f64) -> Self {
        Self {
            words_to_tokens,
            chars_to_tokens,
        }
    }

    pub fn chars_to_tokens(&self) -> f64 {
        self.chars_to_tokens
    }

    /// Estimate the token cost of `text`.
    pub fn estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        let chars = text.chars().count();
        let by_words = (words as f64 * self.words_to_tokens).ceil() as usize;
        let by_chars = (chars as f64 * self.chars_to_tokens).ceil() as usize;
        by_words.max(by_chars)
    }

    /// Largest character count whose char-based estimate fits in `tokens`.
    ///
    /// Used to derive the chunk size from the per-call token budget.
    pub fn chars_for_tokens(&self, tokens: usize) -> usize {
        if self.chars_to_tokens <= 0.0 {
            return usize::MAX;
        }
        ((tokens as f64) / self.chars_to_tokens).floor().max(1.0) as usize
    }
}
