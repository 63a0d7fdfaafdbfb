// src/graph/mod.rs - Shared-attribute corroboration graph
//
// Units from both registries and their attribute values (credit code,
// address, legal person, phone) form an undirected bipartite graph. Two
// units sharing a rare attribute earn a corroboration score; attributes
// shared by many units are worth little. Used only to escalate mid-range
// fuzzy scores, never as the sole basis for a match.
use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::mapping::{FieldMapping, MatchFieldType};
use crate::models::record::Record;
use crate::normalize::text::normalize;
use crate::similarity::address::extract_address_components;
use crate::similarity::phone::normalize_phone;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    CreditCode,
    Address,
    LegalPerson,
    Phone,
}

impl AttributeKind {
    /// Base evidential weight of a shared attribute of this kind.
    fn base_weight(&self) -> f64 {
        match self {
            AttributeKind::CreditCode => 0.9,
            AttributeKind::LegalPerson => 0.5,
            AttributeKind::Address => 0.45,
            AttributeKind::Phone => 0.4,
        }
    }

    fn from_match_type(mt: MatchFieldType, field: &str) -> Option<AttributeKind> {
        match mt {
            MatchFieldType::ExactKey => Some(AttributeKind::CreditCode),
            MatchFieldType::Address => Some(AttributeKind::Address),
            MatchFieldType::Phone => Some(AttributeKind::Phone),
            MatchFieldType::Text if is_legal_person_field(field) => {
                Some(AttributeKind::LegalPerson)
            }
            _ => None,
        }
    }
}

pub(crate) fn is_legal_person_field(field: &str) -> bool {
    let lower = field.to_lowercase();
    lower.contains("法人") || lower.contains("legal") || lower.contains("代表人")
}

#[derive(Debug, Clone, PartialEq)]
enum GraphNode {
    /// Unit identity lives in the `units` map; the node carries no payload.
    Unit,
    Attribute(AttributeKind, String),
}

#[derive(Default)]
struct GraphInner {
    graph: UnGraph<GraphNode, ()>,
    units: HashMap<String, NodeIndex>,
    attributes: HashMap<(AttributeKind, String), NodeIndex>,
}

/// Single-writer, multi-reader: inserts take the write lock for the duration
/// of one node/edge insert; scoring takes the read lock. Append-only within
/// a run, rebuilt wholesale on cold start.
pub struct GraphIndex {
    inner: RwLock<GraphInner>,
}

impl Default for GraphIndex {
    fn default() -> Self {
        GraphIndex::new()
    }
}

impl GraphIndex {
    pub fn new() -> GraphIndex {
        GraphIndex {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    pub fn unit_key(record: &Record) -> String {
        format!("{}:{}", record.registry, record.id)
    }

    /// Adds a unit with the attributes its mapped fields carry. Idempotent:
    /// re-adding a unit or edge changes nothing.
    pub fn add_unit(&self, record: &Record, fields: &[(String, AttributeKind)]) {
        let key = Self::unit_key(record);
        let mut attrs: Vec<(AttributeKind, String)> = Vec::new();
        for (field, kind) in fields {
            if let Some(raw) = record.text(field) {
                if let Some(value) = attribute_value(kind, &raw) {
                    attrs.push((kind.clone(), value));
                }
            }
        }
        if attrs.is_empty() {
            return;
        }

        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let unit_idx = match inner.units.get(&key) {
            Some(idx) => *idx,
            None => {
                let idx = inner.graph.add_node(GraphNode::Unit);
                inner.units.insert(key, idx);
                idx
            }
        };
        for (kind, value) in attrs {
            let attr_key = (kind.clone(), value.clone());
            let attr_idx = match inner.attributes.get(&attr_key) {
                Some(idx) => *idx,
                None => {
                    let idx = inner.graph.add_node(GraphNode::Attribute(kind, value));
                    inner.attributes.insert(attr_key, idx);
                    idx
                }
            };
            if inner.graph.find_edge(unit_idx, attr_idx).is_none() {
                inner.graph.add_edge(unit_idx, attr_idx, ());
            }
        }
    }

    /// Bulk build from both registries. Additive and idempotent.
    pub fn build(&self, records: &[Record], mappings: &[FieldMapping], use_source_fields: bool) {
        let fields = attribute_fields(mappings, use_source_fields);
        for record in records {
            self.add_unit(record, &fields);
        }
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(
            "graph build: {} units, {} attributes",
            inner.units.len(),
            inner.attributes.len()
        );
    }

    /// Attribute values shared by two units.
    pub fn shared_attributes(&self, unit_a: &str, unit_b: &str) -> Vec<(AttributeKind, String)> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (a, b) = match (inner.units.get(unit_a), inner.units.get(unit_b)) {
            (Some(a), Some(b)) => (*a, *b),
            _ => return Vec::new(),
        };
        let mut shared = Vec::new();
        for attr_idx in inner.graph.neighbors(a) {
            if inner.graph.find_edge(b, attr_idx).is_some() {
                if let Some(GraphNode::Attribute(kind, value)) = inner.graph.node_weight(attr_idx)
                {
                    shared.push((kind.clone(), value.clone()));
                }
            }
        }
        shared.sort_by(|x, y| x.1.cmp(&y.1));
        shared
    }

    /// Corroboration score in [0,1]: saturating sum over shared attributes
    /// of base weight times a rarity weight that decreases with the
    /// attribute node's degree.
    pub fn score(&self, unit_a: &str, unit_b: &str) -> f64 {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (a, b) = match (inner.units.get(unit_a), inner.units.get(unit_b)) {
            (Some(a), Some(b)) => (*a, *b),
            _ => return 0.0,
        };
        let mut total = 0.0;
        for attr_idx in inner.graph.neighbors(a) {
            if inner.graph.find_edge(b, attr_idx).is_none() {
                continue;
            }
            if let Some(GraphNode::Attribute(kind, _)) = inner.graph.node_weight(attr_idx) {
                let degree = inner.graph.edges(attr_idx).count();
                total += kind.base_weight() * rarity_weight(degree);
            }
        }
        total.min(1.0)
    }
}

/// Monotonically decreasing in the attribute's degree. An attribute linking
/// exactly the two units under comparison has full rarity.
fn rarity_weight(degree: usize) -> f64 {
    let extra = degree.saturating_sub(2) as f64;
    1.0 / (1.0 + 0.5 * extra)
}

/// The (field, kind) pairs that feed the graph for one side of the mapping.
pub fn attribute_fields(
    mappings: &[FieldMapping],
    use_source_fields: bool,
) -> Vec<(String, AttributeKind)> {
    mappings
        .iter()
        .filter_map(|m| {
            let field = if use_source_fields {
                &m.source_field
            } else {
                &m.target_field
            };
            AttributeKind::from_match_type(m.match_type, field)
                .map(|kind| (field.clone(), kind))
        })
        .collect()
}

/// Canonical attribute value; `None` when the raw text normalizes away.
fn attribute_value(kind: &AttributeKind, raw: &str) -> Option<String> {
    let value = match kind {
        AttributeKind::Phone => normalize_phone(raw),
        AttributeKind::Address => {
            let c = extract_address_components(raw);
            match (&c.street, &c.house_number) {
                (Some(street), Some(house)) => format!("{}{}号", street, house),
                _ => normalize(raw),
            }
        }
        _ => normalize(raw),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Record;

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("address", "reg_address", 0.3, MatchFieldType::Address),
            FieldMapping::new("legal_person", "legal_rep", 0.2, MatchFieldType::Text),
            FieldMapping::new("phone", "contact_phone", 0.1, MatchFieldType::Phone),
        ]
    }

    fn source(id: &str, addr: &str, person: &str) -> Record {
        Record::new("inspection", id)
            .with_text("address", addr)
            .with_text("legal_person", person)
    }

    fn target(id: &str, addr: &str, person: &str) -> Record {
        Record::new("supervision", id)
            .with_text("reg_address", addr)
            .with_text("legal_rep", person)
    }

    #[test]
    fn test_shared_rare_attributes_score_high() {
        let graph = GraphIndex::new();
        let s = source("s1", "上海市虹口区天宝路881号", "张伟");
        let t = target("t1", "虹口区天宝路881号", "张伟");
        let unrelated = target("t2", "北京市朝阳区建国路1号", "李强");
        graph.build(std::slice::from_ref(&s), &mappings(), true);
        graph.build(&[t.clone(), unrelated.clone()], &mappings(), false);

        let related = graph.score(&GraphIndex::unit_key(&s), &GraphIndex::unit_key(&t));
        let distant = graph.score(&GraphIndex::unit_key(&s), &GraphIndex::unit_key(&unrelated));
        assert!(related > 0.5, "related = {}", related);
        assert_eq!(distant, 0.0);

        let shared = graph.shared_attributes(&GraphIndex::unit_key(&s), &GraphIndex::unit_key(&t));
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn test_common_attributes_are_discounted() {
        let graph = GraphIndex::new();
        let s = source("s1", "人民路1号", "张伟");
        graph.build(std::slice::from_ref(&s), &mappings(), true);
        // Many units share the same legal person; rarity decays.
        let mut targets = Vec::new();
        for i in 0..10 {
            targets.push(target(&format!("t{}", i), "", "张伟"));
        }
        graph.build(&targets, &mappings(), false);
        let score = graph.score(
            &GraphIndex::unit_key(&s),
            &GraphIndex::unit_key(&targets[0]),
        );
        assert!(score < 0.2, "score = {}", score);
    }

    #[test]
    fn test_build_is_idempotent() {
        let graph = GraphIndex::new();
        let s = source("s1", "天宝路881号", "张伟");
        let t = target("t1", "天宝路881号", "张伟");
        graph.build(std::slice::from_ref(&s), &mappings(), true);
        graph.build(std::slice::from_ref(&t), &mappings(), false);
        let first = graph.score(&GraphIndex::unit_key(&s), &GraphIndex::unit_key(&t));
        graph.build(std::slice::from_ref(&t), &mappings(), false);
        graph.build(std::slice::from_ref(&s), &mappings(), true);
        let second = graph.score(&GraphIndex::unit_key(&s), &GraphIndex::unit_key(&t));
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_units_score_zero() {
        let graph = GraphIndex::new();
        assert_eq!(graph.score("inspection:x", "supervision:y"), 0.0);
        assert!(graph
            .shared_attributes("inspection:x", "supervision:y")
            .is_empty());
    }
}
