use crate::error::{ContextError, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Token counter backed by the `cl100k_base` encoding
///
/// Cloning shares the loaded encoder.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ContextError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Longest token-prefix of `text` holding at most `max_tokens` tokens
    ///
    /// Backs off a token at a time when a cut would split a UTF-8 sequence.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..end].to_vec()) {
                return prefix;
            }
            end -= 1;
        }
        String::new()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCounter(cl100k_base)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_truncates_on_token_boundaries() {
        let counter = TokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);

        let text = "def handle_request(request):\n    return process(request.body)\n".repeat(20);
        let total = counter.count(&text);
        assert!(total > 40);

        let cut = counter.truncate(&text, 25);
        assert!(text.starts_with(&cut));
        assert!(!cut.is_empty() && cut.len() < text.len());
        assert_eq!(counter.truncate(&text, total), text);
        assert_eq!(counter.truncate(&text, 0), "");
    }

    #[test]
    fn multibyte_text_stays_valid() {
        let counter = TokenCounter::new().unwrap();
        let text = "日本語のテキストと絵文字 🚀🚀🚀 が混ざった文章";
        for limit in 0..counter.count(text) {
            let cut = counter.truncate(text, limit);
            assert!(text.starts_with(&cut));
        }
    }
}
