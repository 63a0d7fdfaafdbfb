// src/normalize/dicts.rs - Dictionaries driving normalization and decomposition
//
// Ordering matters in several of these tables: suffix and synonym matching is
// longest-first, and region matching tries districts before cities before
// provinces.
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Province-level divisions, including the four municipalities. Matched as
/// literal prefixes.
pub const PROVINCES: [&str; 34] = [
    "北京市", "天津市", "上海市", "重庆市", "河北省", "山西省", "辽宁省", "吉林省",
    "黑龙江省", "江苏省", "浙江省", "安徽省", "福建省", "江西省", "山东省", "河南省",
    "湖北省", "湖南省", "广东省", "海南省", "四川省", "贵州省", "云南省", "陕西省",
    "甘肃省", "青海省", "台湾省", "内蒙古自治区", "广西壮族自治区", "西藏自治区",
    "宁夏回族自治区", "新疆维吾尔自治区", "香港特别行政区", "澳门特别行政区",
];

/// Single-character administrative abbreviations folded to the full division
/// name. Applied only as a last resort, when no full division name matched
/// and the name continues past the abbreviation.
pub static REGION_ABBREVIATIONS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert('京', "北京");
    m.insert('沪', "上海");
    m.insert('津', "天津");
    m.insert('渝', "重庆");
    m.insert('粤', "广东");
    m.insert('浙', "浙江");
    m.insert('苏', "江苏");
    m.insert('鲁', "山东");
    m.insert('闽', "福建");
    m
});

/// Characters that close a generic administrative-division segment.
pub const DIVISION_SUFFIXES: [char; 7] = ['省', '市', '区', '县', '州', '盟', '旗'];

/// Legal-form suffixes, longest first so that the most specific form wins.
pub const COMPANY_SUFFIXES: [&str; 30] = [
    "股份有限责任公司",
    "集团股份有限公司",
    "股份有限公司",
    "有限责任公司",
    "集团有限公司",
    "股份合作公司",
    "有限合伙企业",
    "个体工商户",
    "有限公司",
    "总公司",
    "分公司",
    "合作社",
    "事务所",
    "研究所",
    "营业部",
    "门市部",
    "经营部",
    "办事处",
    "服务部",
    "公司",
    "集团",
    "支行",
    "分行",
    "商行",
    "中心",
    "工厂",
    "厂",
    "店",
    "部",
    "行",
];

/// Trade keywords, longest first. The decomposer takes the longest keyword
/// still present after region and legal-form stripping.
pub const BUSINESS_KEYWORDS: [&str; 44] = [
    "房地产开发",
    "物业管理",
    "餐饮管理",
    "商务咨询",
    "信息科技",
    "电子商务",
    "建筑工程",
    "装饰工程",
    "劳务派遣",
    "汽车销售",
    "医疗器械",
    "教育培训",
    "食品",
    "餐饮",
    "银行",
    "保险",
    "证券",
    "医院",
    "药店",
    "药业",
    "学校",
    "小学",
    "中学",
    "幼儿园",
    "宾馆",
    "酒店",
    "旅馆",
    "超市",
    "商贸",
    "贸易",
    "科技",
    "建筑",
    "建材",
    "物流",
    "运输",
    "化工",
    "纺织",
    "服饰",
    "电子",
    "机械",
    "加油站",
    "网吧",
    "娱乐",
    "物业",
];

/// Registered organization-name synonyms, folded during normalization so
/// that the registered short form and the full form compare as equal.
/// Longest first.
pub const NAME_SYNONYMS: [(&str, &str); 8] = [
    ("浦东发展银行", "浦发银行"),
    ("中国工商银行", "工商银行"),
    ("中国建设银行", "建设银行"),
    ("中国农业银行", "农业银行"),
    ("中国人民银行", "人民银行"),
    ("农村信用合作社", "农信社"),
    ("国际贸易", "国贸"),
    ("对外经济贸易", "外经贸"),
];

/// Mutually exclusive trade pairs. A business-type sub-score is capped when
/// the two sides land on opposite ends of one of these.
pub const BUSINESS_CONFLICTS: [(&str, &str); 12] = [
    ("幼儿园", "加油站"),
    ("幼儿园", "网吧"),
    ("幼儿园", "化工"),
    ("学校", "加油站"),
    ("学校", "娱乐"),
    ("医院", "学校"),
    ("医院", "宾馆"),
    ("医院", "餐饮"),
    ("银行", "餐饮"),
    ("银行", "宾馆"),
    ("药店", "加油站"),
    ("食品", "化工"),
];

/// Tokens too generic to discriminate between units; dropped during
/// candidate-token extraction.
pub const STOPWORD_TOKENS: [&str; 22] = [
    "有限", "公司", "责任", "股份", "集团", "中国", "国际", "发展", "管理", "服务",
    "经营", "科技", "信息", "咨询", "实业", "投资", "控股", "连锁", "分店", "总店",
    "新区", "开发",
];

/// Common same-pinyin character groups used by the phonetic channel of the
/// string similarity blend. Far from exhaustive; covers frequent confusions
/// between registry spellings.
pub const HOMOPHONE_GROUPS: [&str; 24] = [
    "惠慧汇辉徽会",
    "伟维卫威炜玮",
    "华骅铧",
    "明铭鸣茗",
    "兴星欣鑫馨",
    "源原元圆缘园",
    "富馥福赋",
    "利立丽莉力",
    "佳嘉家加",
    "胜盛晟圣",
    "昌长常",
    "成诚城承",
    "德得",
    "安鞍",
    "宝保葆",
    "隆龙珑",
    "祥翔详",
    "泰太钛",
    "瑞睿锐",
    "金津锦",
    "永勇咏",
    "顺舜",
    "达大答",
    "同桐铜彤",
];

/// Lookup from character to homophone group index.
pub static HOMOPHONE_INDEX: Lazy<HashMap<char, usize>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (i, group) in HOMOPHONE_GROUPS.iter().enumerate() {
        for ch in group.chars() {
            m.insert(ch, i);
        }
    }
    m
});

/// Street-type suffixes recognized by address component extraction.
pub const STREET_SUFFIXES: [&str; 6] = ["大道", "路", "街", "道", "巷", "里"];

/// Building markers following a digit run.
pub const BUILDING_SUFFIXES: [&str; 4] = ["号楼", "栋", "幢", "楼"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes_ordered_longest_first_where_it_matters() {
        // A shorter suffix must never shadow a longer one that contains it.
        let pos_full = COMPANY_SUFFIXES
            .iter()
            .position(|s| *s == "股份有限公司")
            .unwrap();
        let pos_short = COMPANY_SUFFIXES.iter().position(|s| *s == "公司").unwrap();
        assert!(pos_full < pos_short);
    }

    #[test]
    fn test_homophone_index_covers_groups() {
        assert_eq!(HOMOPHONE_INDEX.get(&'惠'), HOMOPHONE_INDEX.get(&'慧'));
        assert_ne!(HOMOPHONE_INDEX.get(&'惠'), HOMOPHONE_INDEX.get(&'伟'));
        assert!(HOMOPHONE_INDEX.get(&'为').is_none());
    }

    #[test]
    fn test_conflicts_are_known_keywords() {
        for (a, b) in BUSINESS_CONFLICTS {
            assert!(BUSINESS_KEYWORDS.contains(&a), "{} not a keyword", a);
            assert!(BUSINESS_KEYWORDS.contains(&b), "{} not a keyword", b);
        }
    }
}
