use once_cell::sync::Lazy;
use regex::Regex;

static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Split code text into lowercase lexical terms
///
/// camelCase and snake_case identifiers are split into their parts,
/// punctuation becomes whitespace, and single-character terms are dropped.
pub fn tokenize_code(text: &str) -> Vec<String> {
    let normalized = CAMEL_BOUNDARY.replace_all(text, "$1 $2").replace('_', " ");
    let normalized = NON_WORD.replace_all(&normalized, " ").to_lowercase();
    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .map(str::to_string)
        .collect()
}
