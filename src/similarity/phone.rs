// src/similarity/phone.rs - Phone number similarity
//
// Digits-only normalization, exact match, else suffix match on the last 7-8
// digits at a reduced score, else 0. Area-code and separator differences
// between the registries are the common case the suffix tiers absorb.
use unicode_normalization::UnicodeNormalization;

const SUFFIX_8_SCORE: f64 = 0.8;
const SUFFIX_7_SCORE: f64 = 0.75;
const MIN_MEANINGFUL_DIGITS: usize = 5;

/// Keeps only decimal digits; full-width digits fold first.
pub fn normalize_phone(raw: &str) -> String {
    raw.nfkc()
        .collect::<String>()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

pub fn phone_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_phone(a);
    let nb = normalize_phone(b);
    if na.len() < MIN_MEANINGFUL_DIGITS || nb.len() < MIN_MEANINGFUL_DIGITS {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    if na.len() >= 8 && nb.len() >= 8 && na[na.len() - 8..] == nb[nb.len() - 8..] {
        return SUFFIX_8_SCORE;
    }
    if na.len() >= 7 && nb.len() >= 7 && na[na.len() - 7..] == nb[nb.len() - 7..] {
        return SUFFIX_7_SCORE;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_insensitive_exact() {
        assert_eq!(phone_similarity("021-6307-1234", "02163071234"), 1.0);
        assert_eq!(phone_similarity("０２１６３０７１２３４", "02163071234"), 1.0);
    }

    #[test]
    fn test_suffix_tiers() {
        // Same 8-digit local number, one side without the area code.
        assert_eq!(phone_similarity("021-63071234", "63071234"), SUFFIX_8_SCORE);
        // 7-digit overlap only.
        assert_eq!(phone_similarity("3071234", "98071234"), 0.0);
        assert_eq!(phone_similarity("3071234", "021-3071234"), SUFFIX_7_SCORE);
    }

    #[test]
    fn test_no_match() {
        assert_eq!(phone_similarity("63071234", "63079999"), 0.0);
    }

    #[test]
    fn test_empty_and_junk_operands() {
        assert_eq!(phone_similarity("", "63071234"), 0.0);
        assert_eq!(phone_similarity("63071234", ""), 0.0);
        assert_eq!(phone_similarity("无", "63071234"), 0.0);
        assert_eq!(phone_similarity("123", "123"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        assert_eq!(
            phone_similarity("021-63071234", "63071234"),
            phone_similarity("63071234", "021-63071234")
        );
    }
}
