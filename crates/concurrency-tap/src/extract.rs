//! Heuristic point extraction from payloads of unknown shape.
//!
//! Two strategies run over every payload and their results are concatenated
//! in traversal order:
//!
//! - **Deep list search** walks the whole tree and treats any sequence longer
//!   than `min_list_len` whose first element is a sequence or mapping as a
//!   point list.
//! - **Keyed field search** looks at well-known container keys on the top-level
//!   mapping, then at the payload itself as a single point.
//!
//! Overlap between the two is expected; the store deduplicates by timestamp.

use serde_json::{Map, Value};

use crate::config::{AliasPolicy, TapConfig};
use crate::types::CandidatePoint;

/// Top-level keys that commonly hold a point list, in lookup order.
pub const CONTAINER_KEYS: [&str; 5] = ["Response", "data", "points", "series", "values"];

/// Keys that may hold a point's timestamp, in lookup order.
pub const TIMESTAMP_KEYS: [&str; 4] = ["x", "time", "AsOfHour", "timestamp"];

/// Keys that may hold a point's value, in lookup order.
pub const VALUE_KEYS: [&str; 4] = ["y", "value", "PlatformConcurrent", "user_count"];

/// Null, false, zero, and empty strings, sequences, or mappings.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Schema-free point extractor.
#[derive(Debug, Clone)]
pub struct Extractor {
    min_list_len: usize,
    max_depth: usize,
    alias_policy: AliasPolicy,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::from_config(&TapConfig::default())
    }
}

impl Extractor {
    pub fn from_config(config: &TapConfig) -> Self {
        Self {
            min_list_len: config.min_list_len,
            max_depth: config.max_depth,
            alias_policy: config.alias_policy,
        }
    }

    /// Extract all candidate points from a decoded payload.
    pub fn extract<'a>(&self, payload: &'a Value) -> Vec<CandidatePoint<'a>> {
        let mut out = Vec::new();
        self.deep_list_search(payload, 0, &mut out);
        self.keyed_field_search(payload, &mut out);
        out
    }

    fn deep_list_search<'a>(&self, node: &'a Value, depth: usize, out: &mut Vec<CandidatePoint<'a>>) {
        if depth >= self.max_depth {
            tracing::debug!("payload nesting exceeds {} levels, not descending", self.max_depth);
            return;
        }

        match node {
            Value::Array(items) => {
                if self.is_point_list(items) {
                    out.extend(items.iter().filter_map(|item| self.parse_element(item)));
                }
                for item in items {
                    self.deep_list_search(item, depth + 1, out);
                }
            }
            Value::Object(map) => {
                for child in map.values() {
                    self.deep_list_search(child, depth + 1, out);
                }
            }
            _ => {}
        }
    }

    fn keyed_field_search<'a>(&self, payload: &'a Value, out: &mut Vec<CandidatePoint<'a>>) {
        if let Value::Object(map) = payload {
            for key in CONTAINER_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    out.extend(items.iter().filter_map(|item| self.parse_element(item)));
                }
            }
        }
        out.extend(self.parse_element(payload));
    }

    fn is_point_list(&self, items: &[Value]) -> bool {
        items.len() > self.min_list_len
            && matches!(items.first(), Some(Value::Array(_) | Value::Object(_)))
    }

    /// Positional pair or alias-keyed mapping. Anything else yields nothing.
    fn parse_element<'a>(&self, element: &'a Value) -> Option<CandidatePoint<'a>> {
        match element {
            Value::Array(items) if items.len() >= 2 => Some(CandidatePoint {
                timestamp: Some(&items[0]),
                value: Some(&items[1]),
            }),
            Value::Object(map) => {
                let timestamp = self.resolve_alias(map, &TIMESTAMP_KEYS);
                let value = self.resolve_alias(map, &VALUE_KEYS);
                if timestamp.is_none() && value.is_none() {
                    return None;
                }
                Some(CandidatePoint { timestamp, value })
            }
            _ => None,
        }
    }

    fn resolve_alias<'a>(&self, map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
        aliases
            .iter()
            .filter_map(|key| map.get(*key))
            .find(|value| match self.alias_policy {
                AliasPolicy::SkipFalsy => !is_falsy(value),
                AliasPolicy::PresenceOnly => !value.is_null(),
            })
    }
}
