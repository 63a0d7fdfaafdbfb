// src/similarity/mod.rs - Per-field similarity dispatch
//
// Every function here is pure, deterministic, bounded to [0,1], and returns
// 0 whenever either operand is empty after normalization. Nothing is ever
// guessed from partial data.

pub mod address;
pub mod numeric;
pub mod phone;
pub mod string;

use crate::models::mapping::{MatchConfig, MatchFieldType};
use crate::models::record::FieldValue;

pub use address::{address_similarity, extract_address_components, AddressComponents};
pub use numeric::numeric_similarity;
pub use phone::{normalize_phone, phone_similarity};
pub use string::{phonetic_similarity, string_similarity};

/// Scores one mapped field pair according to its declared match type.
/// `None` means the field carried no comparable signal on at least one side
/// and must be excluded from weighted blending rather than scored as 0.
pub fn score_field(
    a: Option<&FieldValue>,
    b: Option<&FieldValue>,
    match_type: MatchFieldType,
    cfg: &MatchConfig,
) -> Option<f64> {
    match match_type {
        MatchFieldType::Numeric => {
            let x = a.and_then(|v| v.as_number())?;
            let y = b.and_then(|v| v.as_number())?;
            Some(numeric_similarity(x, y, cfg.numeric_tolerance))
        }
        _ => {
            let x = a.and_then(|v| v.as_text())?;
            let y = b.and_then(|v| v.as_text())?;
            let score = match match_type {
                MatchFieldType::Address => address_similarity(&x, &y),
                MatchFieldType::Phone => phone_similarity(&x, &y),
                // ExactKey equality is handled by the pipeline's first
                // stage; as a blended field it degrades to a string score.
                MatchFieldType::ExactKey | MatchFieldType::Name | MatchFieldType::Text => {
                    string_similarity(&x, &y, cfg.phonetic_channel)
                }
                MatchFieldType::Numeric => unreachable!(),
            };
            Some(score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::FieldValue;

    #[test]
    fn test_missing_field_is_excluded_not_zero() {
        let cfg = MatchConfig::default();
        let a = FieldValue::String("上海为民食品厂".to_string());
        assert_eq!(
            score_field(Some(&a), None, MatchFieldType::Name, &cfg),
            None
        );
        assert_eq!(
            score_field(
                Some(&a),
                Some(&FieldValue::Null),
                MatchFieldType::Name,
                &cfg
            ),
            None
        );
    }

    #[test]
    fn test_all_types_bounded() {
        let cfg = MatchConfig::default();
        let pairs = [
            ("上海为民食品厂", "上海惠民食品厂", MatchFieldType::Name),
            ("021-63071234", "63071234", MatchFieldType::Phone),
            ("上海市虹口区天宝路881号", "天宝路828号", MatchFieldType::Address),
            ("12.5", "13.0", MatchFieldType::Numeric),
        ];
        for (x, y, mt) in pairs {
            let a = FieldValue::String(x.to_string());
            let b = FieldValue::String(y.to_string());
            let s = score_field(Some(&a), Some(&b), mt, &cfg).unwrap();
            assert!((0.0..=1.0).contains(&s), "{:?} out of bounds: {}", mt, s);
        }
    }
}
