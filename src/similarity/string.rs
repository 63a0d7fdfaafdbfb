// src/similarity/string.rs - String similarity blend
//
// Blend of a set-aware edit-distance ratio and a best-alignment channel
// (positional Jaro-Winkler or bigram overlap, whichever is higher, so that
// block-reordered constituents still align), with an optional phonetic
// channel for CJK text driven by the embedded homophone table.
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::normalize::dicts::HOMOPHONE_INDEX;
use crate::normalize::text::{cjk_ratio, is_cjk, normalize};

const EDIT_WEIGHT: f64 = 0.5;
const ALIGNMENT_WEIGHT: f64 = 0.5;
const PHONETIC_WEIGHT: f64 = 0.2;
/// Both operands must be predominantly CJK for the phonetic channel.
const PHONETIC_MIN_CJK_RATIO: f64 = 0.6;

/// Similarity of two strings in [0,1]. Empty-after-normalization on either
/// side returns 0. Near-symmetric by construction.
pub fn string_similarity(a: &str, b: &str, phonetic: bool) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let edit = normalized_levenshtein(&sorted_units(&na), &sorted_units(&nb));
    // Jaro-Winkler's matching window rejects block reordering outright, so
    // the alignment channel takes the better of it and a bigram overlap.
    let alignment = jaro_winkler(&na, &nb).max(bigram_overlap(&na, &nb));

    let use_phonetic = phonetic
        && cjk_ratio(&na) >= PHONETIC_MIN_CJK_RATIO
        && cjk_ratio(&nb) >= PHONETIC_MIN_CJK_RATIO;

    let score = if use_phonetic {
        let base = 1.0 - PHONETIC_WEIGHT;
        base * (EDIT_WEIGHT * edit + ALIGNMENT_WEIGHT * alignment)
            + PHONETIC_WEIGHT * phonetic_similarity(&na, &nb)
    } else {
        EDIT_WEIGHT * edit + ALIGNMENT_WEIGHT * alignment
    };
    score.clamp(0.0, 1.0)
}

/// Characters sorted into a canonical order so that reordered constituents
/// ("虹口区上海" vs "上海虹口区") still compare well under edit distance.
fn sorted_units(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

/// Dice coefficient over the character-bigram multisets. Insensitive to the
/// order of whole constituents: "宏达商贸" and "商贸宏达" share 宏达 and 商贸.
fn bigram_overlap(a: &str, b: &str) -> f64 {
    let ga = bigrams(a);
    let gb = bigrams(b);
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let mut remaining = gb.clone();
    let mut matches = 0usize;
    for g in &ga {
        if let Some(pos) = remaining.iter().position(|h| h == g) {
            remaining.swap_remove(pos);
            matches += 1;
        }
    }
    2.0 * matches as f64 / (ga.len() + gb.len()) as f64
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Fraction of characters whose pinyin classes agree, computed as a
/// symmetric multiset overlap: characters in the same homophone group count
/// as equal even when written differently.
pub fn phonetic_similarity(a: &str, b: &str) -> f64 {
    let ka = phonetic_keys(a);
    let kb = phonetic_keys(b);
    if ka.is_empty() || kb.is_empty() {
        return 0.0;
    }
    let mut remaining = kb.clone();
    let mut matches = 0usize;
    for key in &ka {
        if let Some(pos) = remaining.iter().position(|k| k == key) {
            remaining.swap_remove(pos);
            matches += 1;
        }
    }
    2.0 * matches as f64 / (ka.len() + kb.len()) as f64
}

#[derive(Clone, PartialEq)]
enum PhoneticKey {
    Group(usize),
    Literal(char),
}

fn phonetic_keys(text: &str) -> Vec<PhoneticKey> {
    text.chars()
        .filter(|c| is_cjk(*c) || c.is_alphanumeric())
        .map(|c| match HOMOPHONE_INDEX.get(&c) {
            Some(group) => PhoneticKey::Group(*group),
            None => PhoneticKey::Literal(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_after_normalization() {
        assert_eq!(string_similarity("华联超市", "华联·超市", true), 1.0);
        assert_eq!(
            string_similarity("上海浦东发展银行", "上海浦发银行", true),
            1.0
        );
    }

    #[test]
    fn test_empty_operand_law() {
        assert_eq!(string_similarity("上海为民食品厂", "", true), 0.0);
        assert_eq!(string_similarity("", "上海为民食品厂", true), 0.0);
        assert_eq!(string_similarity("", "", true), 0.0);
        assert_eq!(string_similarity("（）", "上海为民食品厂", true), 0.0);
    }

    #[test]
    fn test_near_symmetry() {
        let pairs = [
            ("上海为民食品厂", "上海惠民食品厂"),
            ("宏达商贸", "商贸宏达"),
            ("abc company", "abc co"),
        ];
        for (a, b) in pairs {
            let ab = string_similarity(a, b, true);
            let ba = string_similarity(b, a, true);
            assert!((ab - ba).abs() < 0.02, "{} vs {}: {} != {}", a, b, ab, ba);
        }
    }

    #[test]
    fn test_bounds() {
        for (a, b) in [("甲", "乙"), ("甲乙丙丁", "甲乙"), ("x", "xyz")] {
            let s = string_similarity(a, b, true);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_reordering_tolerance() {
        let reordered = string_similarity("宏达商贸", "商贸宏达", false);
        let unrelated = string_similarity("宏达商贸", "天宝物流", false);
        assert!(reordered > unrelated);
        assert!(reordered > 0.6);
    }

    #[test]
    fn test_homophone_channel_lifts_same_sound_spelling() {
        // 汇丰 vs 惠丰: different characters, same pinyin class.
        let with = string_similarity("上海汇丰商贸", "上海惠丰商贸", true);
        let without = string_similarity("上海汇丰商贸", "上海惠丰商贸", false);
        assert!(with > without);
    }

    #[test]
    fn test_phonetic_similarity_symmetric() {
        let ab = phonetic_similarity("汇丰", "惠丰");
        let ba = phonetic_similarity("惠丰", "汇丰");
        assert_eq!(ab, ba);
        assert_eq!(ab, 1.0);
    }
}
