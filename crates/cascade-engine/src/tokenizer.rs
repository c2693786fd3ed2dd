//! Approximate token counting, used only when a provider adapter doesn't
//! report usage itself. Not a tokenizer for any specific vendor's vocabulary
//! — a cheap heuristic good enough to attribute cost when the real number
//! is unavailable.
//!
//! Grounded on `fluent_core::cost_calculator`'s `calculate_cost` call
//! sites, which always had vendor-reported usage on hand; this fills the
//! gap for adapters that omit usage reporting — count input tokens via
//! this estimator instead.

/// Average English text runs close to 4 characters per token for the
/// common tokenizers (cl100k/bpe-family); we also weight in whitespace-
/// delimited word count so very terse or very dense text doesn't skew too
/// far from either estimator alone.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let char_based = (text.chars().count() as f64 / 4.0).ceil();
    let word_based = text.split_whitespace().count() as f64 * 1.3;
    char_based.max(word_based).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_costs_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn short_prompt_yields_a_plausible_estimate() {
        let tokens = estimate_tokens("The quick brown fox jumps over the lazy dog.");
        assert!(tokens >= 8 && tokens <= 16, "got {tokens}");
    }

    #[test]
    fn longer_text_scales_roughly_with_length() {
        let short = estimate_tokens("hello world");
        let long = estimate_tokens(&"hello world ".repeat(50));
        assert!(long > short * 20);
    }
}
