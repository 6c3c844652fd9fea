//! Approximate token counting.
//!
//! These are character-length heuristics, not tokenizers. Anything shown to a
//! user from here should be labeled approximate.

/// `ceil(chars / 4)`, the usual rule of thumb for English text on BPE vocabularies.
pub fn approx_token_count(text: &str) -> usize {
    approx_with_ratio(text, 4)
}

/// `ceil(chars / chars_per_token)`.
pub fn approx_with_ratio(text: &str, chars_per_token: usize) -> usize {
    let chars = text.chars().count();
    if chars_per_token == 0 {
        return chars;
    }
    chars.div_ceil(chars_per_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(approx_token_count(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(approx_token_count("abc"), 1);
        assert_eq!(approx_token_count("abcd"), 1);
        assert_eq!(approx_token_count("abcde"), 2);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // four multi-byte chars
        assert_eq!(approx_token_count("éééé"), 1);
    }

    #[test]
    fn test_custom_ratio() {
        assert_eq!(approx_with_ratio("abcdefg", 3), 3);
        assert_eq!(approx_with_ratio("abc", 0), 3);
    }
}
