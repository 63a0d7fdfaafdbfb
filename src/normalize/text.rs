// src/normalize/text.rs - Chinese-aware text normalization
//
// Pure and deterministic; no I/O. Two inputs differing only by legal-form
// suffix or punctuation normalize identically, and empty-after-normalization
// is treated by every caller as "no value".
use unicode_normalization::UnicodeNormalization;

use crate::normalize::dicts::{COMPANY_SUFFIXES, NAME_SYNONYMS, STOPWORD_TOKENS};

pub fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Fraction of alphanumeric/CJK characters that are CJK. Used to decide
/// whether the phonetic channel applies.
pub fn cjk_ratio(text: &str) -> f64 {
    let mut cjk = 0usize;
    let mut total = 0usize;
    for ch in text.chars() {
        if is_cjk(ch) {
            cjk += 1;
            total += 1;
        } else if ch.is_alphanumeric() {
            total += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

/// NFKC width fold + lowercase + bracketed-annotation removal + registered
/// synonym folding. Keeps legal-form suffixes; `normalize` strips them.
pub fn clean(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    let without_brackets = strip_bracketed(&folded);
    fold_synonyms(&without_brackets)
}

/// Full normalization: `clean`, then longest-match legal-form suffix
/// stripping and removal of everything that is neither CJK nor alphanumeric.
pub fn normalize(text: &str) -> String {
    let cleaned = clean(text);
    let stripped = strip_company_suffix(&cleaned);
    stripped
        .chars()
        .filter(|c| is_cjk(*c) || c.is_alphanumeric())
        .collect()
}

/// Removes annotations in CJK or ASCII brackets, including unbalanced
/// trailing ones. NFKC has already folded full-width brackets to ASCII.
fn strip_bracketed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '(' | '[' | '【' | '〔' | '《' => depth += 1,
            ')' | ']' | '】' | '〕' | '》' => {
                depth = depth.saturating_sub(1);
            }
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Folds each registered long form to its canonical short form, longest
/// entry first so nested synonyms cannot clip one another.
fn fold_synonyms(text: &str) -> String {
    let mut out = text.to_string();
    for (long, short) in NAME_SYNONYMS {
        if out.contains(long) {
            out = out.replace(long, short);
        }
    }
    out
}

/// Strips the longest matching legal-form suffix from the end of the string.
/// At most one suffix is removed; "XX有限公司" and "XX公司" both reduce to "XX".
pub fn strip_company_suffix(text: &str) -> String {
    let trimmed = text.trim_end_matches(|c: char| !is_cjk(c) && !c.is_alphanumeric());
    for suffix in COMPANY_SUFFIXES {
        if let Some(stem) = trimmed.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Returns the legal-form suffix of the string, if any.
pub fn company_suffix_of(text: &str) -> Option<&'static str> {
    for suffix in COMPANY_SUFFIXES {
        if text.ends_with(suffix) && text.chars().count() > suffix.chars().count() {
            return Some(suffix);
        }
    }
    None
}

/// Salient tokens for indexing and candidate overlap: ASCII alphanumeric
/// runs verbatim, CJK runs as overlapping bigrams plus the whole run.
/// Stopword tokens are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    let mut tokens = Vec::new();
    let mut ascii_run = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let mut flush_ascii = |run: &mut String, tokens: &mut Vec<String>| {
        if run.len() >= 2 {
            tokens.push(run.clone());
        }
        run.clear();
    };
    let mut flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        if run.len() == 1 {
            tokens.push(run[0].to_string());
        } else if run.len() >= 2 {
            for pair in run.windows(2) {
                tokens.push(pair.iter().collect());
            }
            if run.len() > 2 {
                tokens.push(run.iter().collect());
            }
        }
        run.clear();
    };

    for ch in normalized.chars() {
        if is_cjk(ch) {
            flush_ascii(&mut ascii_run, &mut tokens);
            cjk_run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            ascii_run.push(ch);
        } else {
            flush_ascii(&mut ascii_run, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_ascii(&mut ascii_run, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);

    tokens.retain(|t| !STOPWORD_TOKENS.contains(&t.as_str()));
    tokens.dedup();
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_folding() {
        assert_eq!(normalize("ＡＢＣ１２３"), "abc123");
        assert_eq!(normalize("ABC123"), "abc123");
    }

    #[test]
    fn test_suffix_only_difference_normalizes_identically() {
        assert_eq!(normalize("上海为民食品厂"), normalize("上海为民食品"));
        assert_eq!(
            normalize("北京同仁堂有限公司"),
            normalize("北京同仁堂股份有限公司")
        );
    }

    #[test]
    fn test_punctuation_only_difference_normalizes_identically() {
        assert_eq!(normalize("华联·超市"), normalize("华联超市"));
        assert_eq!(normalize("华 联 超 市"), normalize("华联超市"));
    }

    #[test]
    fn test_bracketed_annotation_removed() {
        assert_eq!(
            normalize("上海惠民食品厂（原为民食品厂）"),
            normalize("上海惠民食品厂")
        );
        assert_eq!(normalize("宏达商贸(集团)有限公司"), normalize("宏达商贸有限公司"));
    }

    #[test]
    fn test_registered_synonym_folds() {
        assert_eq!(normalize("上海浦东发展银行"), normalize("上海浦发银行"));
    }

    #[test]
    fn test_empty_after_normalization() {
        assert_eq!(normalize("（）·—— "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_tokenize_cjk_bigrams() {
        let tokens = tokenize("上海为民食品厂");
        assert!(tokens.contains(&"为民".to_string()));
        assert!(tokens.contains(&"食品".to_string()));
        assert!(tokens.contains(&"上海为民食品".to_string()));
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        let tokens = tokenize("中国发展有限公司");
        assert!(!tokens.contains(&"有限".to_string()));
        assert!(!tokens.contains(&"发展".to_string()));
    }

    #[test]
    fn test_cjk_ratio() {
        assert!(cjk_ratio("上海浦东abc") > 0.5);
        assert_eq!(cjk_ratio("abc"), 0.0);
        assert_eq!(cjk_ratio(""), 0.0);
    }
}
