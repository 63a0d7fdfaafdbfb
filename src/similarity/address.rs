// src/similarity/address.rs - Component-wise address similarity
//
// Addresses are compared component by component: house number and street
// carry the most weight, administrative divisions the least. A house-number
// mismatch when both sides carry one applies a multiplicative penalty, and
// two or more exactly matching key components earn a bonus.
use crate::normalize::decompose::consume_region;
use crate::normalize::dicts::{BUILDING_SUFFIXES, DIVISION_SUFFIXES, STREET_SUFFIXES};
use crate::normalize::text::{clean, is_cjk};
use crate::similarity::string::string_similarity;

const WEIGHT_STREET: f64 = 0.30;
const WEIGHT_HOUSE_NUMBER: f64 = 0.30;
const WEIGHT_BUILDING: f64 = 0.10;
const WEIGHT_DISTRICT: f64 = 0.12;
const WEIGHT_CITY: f64 = 0.10;
const WEIGHT_PROVINCE: f64 = 0.08;

const HOUSE_NUMBER_MISMATCH_PENALTY: f64 = 0.6;
const KEY_COMPONENT_BONUS: f64 = 1.1;
/// Whole-string fallback is discounted; component agreement is the real
/// signal for addresses.
const FALLBACK_DISCOUNT: f64 = 0.8;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressComponents {
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub building: Option<String>,
}

impl AddressComponents {
    pub fn is_empty(&self) -> bool {
        self.province.is_none()
            && self.city.is_none()
            && self.district.is_none()
            && self.street.is_none()
            && self.house_number.is_none()
            && self.building.is_none()
    }
}

/// Splits an address into administrative, street, house-number and building
/// components. Total: unparseable text just yields empty components.
pub fn extract_address_components(address: &str) -> AddressComponents {
    let cleaned: String = clean(address)
        .chars()
        .filter(|c| is_cjk(*c) || c.is_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        return AddressComponents::default();
    }

    let (region, rest) = consume_region(&cleaned);
    let (province, city, district) = split_region(&region);

    let (street, after_street) = take_street(&rest);
    let (house_number, after_house) = take_numbered(&after_street, &["号"]);
    let building_markers: Vec<&str> = BUILDING_SUFFIXES.to_vec();
    let (building, _) = take_numbered(&after_house, &building_markers);

    AddressComponents {
        province,
        city,
        district,
        street,
        house_number,
        building,
    }
}

/// Splits a consumed region run back into province/city/district by the
/// closing division character of each segment.
fn split_region(region: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut province = None;
    let mut city = None;
    let mut district = None;

    let mut segment = String::new();
    let mut chars = region.chars().peekable();
    while let Some(ch) = chars.next() {
        segment.push(ch);
        if !DIVISION_SUFFIXES.contains(&ch) {
            continue;
        }
        // 杭州市 is one segment; the 州 is part of the city name.
        if ch == '州' && chars.peek() == Some(&'市') {
            continue;
        }
        match ch {
            '省' => province = Some(segment.clone()),
            '市' => {
                if province.is_none() && city.is_none() {
                    // Municipality: 上海市 is both province and city.
                    province = Some(segment.clone());
                }
                city = Some(segment.clone());
            }
            '区' | '县' | '旗' => district = Some(segment.clone()),
            _ => city = Some(segment.clone()),
        }
        segment.clear();
    }
    // A bare municipality name without the trailing 市.
    if !segment.is_empty() && province.is_none() && city.is_none() && district.is_none() {
        city = Some(segment);
    }
    (province, city, district)
}

/// Street = everything up to and including the first street suffix.
fn take_street(text: &str) -> (Option<String>, String) {
    let chars: Vec<char> = text.chars().collect();
    let mut best: Option<(usize, usize)> = None; // (end char idx, suffix chars)
    for suffix in STREET_SUFFIXES {
        let suffix_chars: Vec<char> = suffix.chars().collect();
        'outer: for i in 0..chars.len().saturating_sub(suffix_chars.len() - 1) {
            for (j, sc) in suffix_chars.iter().enumerate() {
                if chars[i + j] != *sc {
                    continue 'outer;
                }
            }
            let end = i + suffix_chars.len();
            if end >= 2 {
                match best {
                    Some((current_end, _)) if current_end <= end => {}
                    _ => best = Some((end, suffix_chars.len())),
                }
                break;
            }
        }
    }
    match best {
        Some((end, _)) => {
            let street: String = chars[..end].iter().collect();
            let rest: String = chars[end..].iter().collect();
            (Some(street), rest)
        }
        None => (None, text.to_string()),
    }
}

/// A digit run immediately followed by one of the markers, e.g. "881号" or
/// "3栋". Returns the digits and the text after the marker.
fn take_numbered(text: &str, markers: &[&str]) -> (Option<String>, String) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            for marker in markers {
                let marker_chars: Vec<char> = marker.chars().collect();
                if chars[i..].starts_with(&marker_chars[..]) {
                    let digits: String = chars[start..i].iter().collect();
                    let rest: String = chars[i + marker_chars.len()..].iter().collect();
                    return (Some(digits), rest);
                }
            }
        } else {
            i += 1;
        }
    }
    (None, text.to_string())
}

/// Address similarity in [0,1]. Empty operand on either side returns 0.
pub fn address_similarity(a: &str, b: &str) -> f64 {
    let ca = extract_address_components(a);
    let cb = extract_address_components(b);

    if ca.is_empty() || cb.is_empty() {
        // No structure on at least one side: fall back to a discounted
        // whole-string comparison, which still honors the empty-operand law.
        return string_similarity(a, b, false) * FALLBACK_DISCOUNT;
    }

    let mut weight_sum = 0.0;
    let mut score_sum = 0.0;
    let mut exact_key_components = 0usize;

    let mut compare =
        |x: &Option<String>, y: &Option<String>, weight: f64, exact_only: bool, key: bool| {
            if let (Some(xv), Some(yv)) = (x, y) {
                weight_sum += weight;
                let s = if exact_only {
                    if xv == yv {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    string_similarity(xv, yv, false)
                };
                score_sum += weight * s;
                if key && (s - 1.0).abs() < f64::EPSILON {
                    exact_key_components += 1;
                }
            }
        };

    compare(&ca.street, &cb.street, WEIGHT_STREET, false, true);
    compare(&ca.house_number, &cb.house_number, WEIGHT_HOUSE_NUMBER, true, true);
    compare(&ca.building, &cb.building, WEIGHT_BUILDING, true, true);
    compare(&ca.district, &cb.district, WEIGHT_DISTRICT, false, false);
    compare(&ca.city, &cb.city, WEIGHT_CITY, false, false);
    compare(&ca.province, &cb.province, WEIGHT_PROVINCE, false, false);

    if weight_sum <= 0.0 {
        return string_similarity(a, b, false) * FALLBACK_DISCOUNT;
    }

    let mut score = score_sum / weight_sum;

    let house_mismatch = matches!(
        (&ca.house_number, &cb.house_number),
        (Some(x), Some(y)) if x != y
    );
    if house_mismatch {
        score *= HOUSE_NUMBER_MISMATCH_PENALTY;
    }
    if exact_key_components >= 2 && !house_mismatch {
        score *= KEY_COMPONENT_BONUS;
    }

    score.clamp(0.0, 1.0)
}
