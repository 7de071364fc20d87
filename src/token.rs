//! Token estimation.
//!
//! Chunk budgets are measured in characters. Model context windows are
//! measured in tokens, so dense text can meet the character budget and
//! still be large in tokens. Estimates from this module are only used to
//! report such chunks; they never change how content is split.

use std::sync::Arc;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Type of token estimator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// Character-based estimate (~4 chars per token)
    #[default]
    Simple,
    /// Word and punctuation aware estimate, better for source code
    Enhanced,
}

impl TokenizerKind {
    /// Creates a new estimator of this kind.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        }
    }
}

/// Estimates the number of tokens in a piece of text.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in `text`.
    fn estimate(&self, text: &str) -> usize;
}

/// ~4 characters per token, rounded up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        text.chars()
            .count()
            .div_ceil(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Averages a word-based and a character-based estimate and adds a
/// punctuation penalty, since symbols in code usually tokenize alone.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let mut chars = 0usize;
        let mut special = 0usize;
        for c in text.chars() {
            chars += 1;
            if !c.is_alphanumeric() && !c.is_whitespace() {
                special += 1;
            }
        }
        let words = text.split_whitespace().count();

        let word_estimate = (words as f64 * ENHANCED_WORD_MULTIPLIER) as usize;
        let char_estimate = chars / SIMPLE_CHARS_PER_TOKEN;

        ((word_estimate + char_estimate) / 2 + special / ENHANCED_SPECIAL_DIVISOR).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer_empty() {
        assert_eq!(SimpleTokenizer.estimate(""), 0);
    }

    #[test]
    fn test_simple_tokenizer_rounds_up() {
        assert_eq!(SimpleTokenizer.estimate("test"), 1);
        assert_eq!(SimpleTokenizer.estimate("hello world"), 3);
        assert_eq!(SimpleTokenizer.estimate(&"a".repeat(1000)), 250);
    }

    #[test]
    fn test_simple_tokenizer_counts_chars_not_bytes() {
        assert_eq!(SimpleTokenizer.estimate("éééé"), 1);
    }

    #[test]
    fn test_enhanced_tokenizer_empty() {
        assert_eq!(EnhancedTokenizer.estimate(""), 0);
    }

    #[test]
    fn test_enhanced_tokenizer_code() {
        let code = r#"
            fn main() {
                println!("Hello, world!");
            }
        "#;
        let result = EnhancedTokenizer.estimate(code);
        assert!(result > 5);
        assert!(result < 30);
    }

    #[test]
    fn test_enhanced_penalizes_symbols() {
        let prose = "a".repeat(40);
        let symbols = "{".repeat(40);
        assert!(EnhancedTokenizer.estimate(&symbols) > EnhancedTokenizer.estimate(&prose));
    }

    #[test]
    fn test_kind_creates_matching_estimator() {
        let text = "fn a() {}";
        assert_eq!(
            TokenizerKind::Simple.create().estimate(text),
            SimpleTokenizer.estimate(text)
        );
        assert_eq!(
            TokenizerKind::Enhanced.create().estimate(text),
            EnhancedTokenizer.estimate(text)
        );
    }
}
