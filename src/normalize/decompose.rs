// src/normalize/decompose.rs - Structured decomposition of organization names
//
// Splits a name into {region, core name, business type, company type}.
// Decomposition is total: unrecognized input yields the whole string as the
// core name with low confidence, never an error.
use serde::{Deserialize, Serialize};

use crate::normalize::dicts::{
    BUSINESS_KEYWORDS, DIVISION_SUFFIXES, PROVINCES, REGION_ABBREVIATIONS,
};
use crate::normalize::text::{clean, company_suffix_of, is_cjk};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameStructure {
    pub region: String,
    pub core_name: String,
    pub business_type: String,
    pub company_type: String,
    pub original: String,
    pub parse_confidence: f64,
}

impl NameStructure {
    pub fn is_empty(&self) -> bool {
        self.core_name.is_empty()
            && self.region.is_empty()
            && self.business_type.is_empty()
            && self.company_type.is_empty()
    }
}

/// Parses an organization name. Region prefixes are consumed longest and
/// most-specific first (district before city before province), the legal
/// form is the longest matching suffix, and the business type is the
/// longest trade keyword left in the remainder. What survives is the core.
pub fn parse_name(name: &str) -> NameStructure {
    let cleaned = clean(name);
    let working: String = cleaned
        .chars()
        .filter(|c| is_cjk(*c) || c.is_alphanumeric())
        .collect();

    if working.is_empty() {
        return NameStructure {
            region: String::new(),
            core_name: String::new(),
            business_type: String::new(),
            company_type: String::new(),
            original: name.to_string(),
            parse_confidence: 0.0,
        };
    }

    let (region, after_region) = consume_region(&working);

    // A trailing trade keyword outranks a shorter legal-form suffix it
    // contains: 浦发银行 is core 浦发 + business 银行, not legal form 行.
    let trailing_business = BUSINESS_KEYWORDS
        .iter()
        .filter(|k| after_region.ends_with(**k) && after_region.len() > k.len())
        .max_by_key(|k| k.len());
    let legal_suffix = company_suffix_of(&after_region);

    let (company_type, business_type, core_name) = match (trailing_business, legal_suffix) {
        (Some(biz), legal) if legal.map_or(true, |l| biz.len() >= l.len()) => {
            let stem = after_region[..after_region.len() - biz.len()].to_string();
            (String::new(), biz.to_string(), stem)
        }
        (_, Some(suffix)) => {
            let stem = after_region[..after_region.len() - suffix.len()].to_string();
            let (business, core) = extract_business_type(&stem);
            (suffix.to_string(), business, core)
        }
        (_, None) => {
            let (business, core) = extract_business_type(&after_region);
            (String::new(), business, core)
        }
    };

    let confidence = confidence_for(&region, &core_name, &business_type, &company_type);

    NameStructure {
        region,
        core_name,
        business_type,
        company_type,
        original: name.to_string(),
        parse_confidence: confidence,
    }
}

/// Consumes administrative-division prefixes iteratively: a known province
/// or municipality, then generic segments closed by a division suffix
/// character. "上海市虹口区天宝路..." consumes "上海市" then "虹口区".
pub(crate) fn consume_region(text: &str) -> (String, String) {
    let mut region = String::new();
    let mut rest = text.to_string();

    loop {
        let mut consumed = false;

        for province in PROVINCES {
            if let Some(tail) = rest.strip_prefix(province) {
                region.push_str(province);
                rest = tail.to_string();
                consumed = true;
                break;
            }
            // Municipality names also appear without the trailing 市.
            if let Some(stem) = province.strip_suffix('市') {
                if rest.starts_with(stem) && !rest.starts_with(province) {
                    region.push_str(stem);
                    rest = rest[stem.len()..].to_string();
                    consumed = true;
                    break;
                }
            }
        }

        if !consumed {
            if let Some((segment, tail)) = generic_division_segment(&rest) {
                region.push_str(&segment);
                rest = tail;
                consumed = true;
            }
        }

        if !consumed {
            break;
        }
    }

    // Single-character abbreviation as a last resort, only when nothing
    // else matched and the name continues past it.
    if region.is_empty() {
        let mut chars = rest.chars();
        if let (Some(first), Some(_)) = (chars.next(), chars.next()) {
            if let Some(full) = REGION_ABBREVIATIONS.get(&first) {
                return (full.to_string(), rest[first.len_utf8()..].to_string());
            }
        }
    }

    (region, rest)
}

/// A generic division segment is 2..=6 CJK characters ending with one of the
/// division suffix characters, with a non-empty remainder. The shortest such
/// segment wins, which keeps districts from swallowing street names.
fn generic_division_segment(text: &str) -> Option<(String, String)> {
    let chars: Vec<char> = text.chars().collect();
    let limit = chars.len().min(6);
    for end in 2..=limit {
        if end >= chars.len() {
            break;
        }
        let ch = chars[end - 1];
        if DIVISION_SUFFIXES.contains(&ch) {
            // 州 inside an X州市 city name (杭州市, 苏州市) does not close
            // the segment; the trailing 市 belongs to the same city.
            let end = if ch == '州' && chars.get(end) == Some(&'市') {
                end + 1
            } else {
                end
            };
            if end >= chars.len() {
                return None;
            }
            let segment: String = chars[..end].iter().collect();
            let rest: String = chars[end..].iter().collect();
            if segment.chars().all(is_cjk) {
                return Some((segment, rest));
            }
            return None;
        }
    }
    None
}

/// Longest trade keyword in the remainder, preferring the last occurrence
/// since the business type conventionally trails the core name.
fn extract_business_type(text: &str) -> (String, String) {
    let mut best: Option<(&str, usize)> = None;
    for keyword in BUSINESS_KEYWORDS {
        if let Some(pos) = text.rfind(keyword) {
            let better = match best {
                None => true,
                Some((current, current_pos)) => {
                    keyword.len() > current.len()
                        || (keyword.len() == current.len() && pos > current_pos)
                }
            };
            if better {
                best = Some((keyword, pos));
            }
        }
    }
    match best {
        Some((keyword, pos)) => {
            let mut core = String::new();
            core.push_str(&text[..pos]);
            core.push_str(&text[pos + keyword.len()..]);
            (keyword.to_string(), core)
        }
        None => (String::new(), text.to_string()),
    }
}

/// Coverage-weighted heuristic bounded to [0,1].
fn confidence_for(region: &str, core: &str, business: &str, company: &str) -> f64 {
    let mut confidence: f64 = 0.3;
    if !region.is_empty() {
        confidence += 0.25;
    }
    if !company.is_empty() {
        confidence += 0.2;
    }
    if !business.is_empty() {
        confidence += 0.15;
    }
    let core_len = core.chars().count();
    if (2..=6).contains(&core_len) {
        confidence += 0.1;
    } else if core_len == 0 {
        confidence -= 0.2;
    }
    confidence.clamp(0.0, 1.0)
}
