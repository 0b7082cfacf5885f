//! Tunables for filtering, extraction, and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{TapError, TapResult};

/// Default plausibility threshold for concurrency readings.
pub const DEFAULT_THRESHOLD: i64 = 1000;

/// A sequence must be longer than this to count as a point list.
pub const DEFAULT_MIN_LIST_LEN: usize = 10;

/// Recursion bound for payload traversal.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Which responses are worth inspecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Skip static assets; keep anything whose content type mentions json.
    #[default]
    ContentTypeOnly,
    /// URL must contain a keyword and the body must plausibly decode.
    KeywordAndContentType,
}

/// How alias keys in a point object are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPolicy {
    /// Falsy values (null, false, 0, "", [], {}) count as absent.
    #[default]
    SkipFalsy,
    /// Only missing keys and nulls count as absent.
    PresenceOnly,
}

/// Library configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub filter_policy: FilterPolicy,
    pub url_keywords: Vec<String>,
    pub alias_policy: AliasPolicy,
    pub threshold: i64,
    pub min_list_len: usize,
    pub max_depth: usize,
    /// Skip responses whose URL was already inspected this session.
    pub skip_seen_urls: bool,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            filter_policy: FilterPolicy::default(),
            url_keywords: ["concurrent", "ccu", "players", "chart", "dataset", "stats"]
                .into_iter()
                .map(String::from)
                .collect(),
            alias_policy: AliasPolicy::default(),
            threshold: DEFAULT_THRESHOLD,
            min_list_len: DEFAULT_MIN_LIST_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            skip_seen_urls: false,
        }
    }
}

impl TapConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> TapResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| TapError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> TapResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> TapResult<()> {
        if self.max_depth == 0 {
            return Err(TapError::Config("max_depth must be at least 1".into()));
        }
        if self.filter_policy == FilterPolicy::KeywordAndContentType
            && self.url_keywords.iter().all(|k| k.trim().is_empty())
        {
            return Err(TapError::Config(
                "keyword_and_content_type policy needs at least one url keyword".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TapConfig::default();
        assert_eq!(config.threshold, 1000);
        assert_eq!(config.filter_policy, FilterPolicy::ContentTypeOnly);
        assert_eq!(config.alias_policy, AliasPolicy::SkipFalsy);
        assert!(!config.skip_seen_urls);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TapConfig::from_json(r#"{"threshold": 50, "alias_policy": "presence_only"}"#)
            .unwrap();
        assert_eq!(config.threshold, 50);
        assert_eq!(config.alias_policy, AliasPolicy::PresenceOnly);
        assert_eq!(config.min_list_len, DEFAULT_MIN_LIST_LEN);
    }

    #[test]
    fn test_keyword_policy_requires_keywords() {
        let err = TapConfig::from_json(
            r#"{"filter_policy": "keyword_and_content_type", "url_keywords": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TapError::Config(_)));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(TapConfig::from_json(r#"{"filter_policy": "everything"}"#).is_err());
    }
}
