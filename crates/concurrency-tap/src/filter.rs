//! Decides which captured responses are worth decoding.

use crate::config::{FilterPolicy, TapConfig};
use crate::parser;
use crate::types::{RawResponse, ResponseHead};

/// Response filter for one of the supported policies.
#[derive(Debug, Clone)]
pub struct ResponseFilter {
    policy: FilterPolicy,
    keywords: Vec<String>,
}

impl ResponseFilter {
    pub fn new(policy: FilterPolicy, keywords: &[String]) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { policy, keywords }
    }

    pub fn from_config(config: &TapConfig) -> Self {
        Self::new(config.filter_policy, &config.url_keywords)
    }

    /// Head-only check, used to decide whether fetching the body is worthwhile.
    ///
    /// Never rejects a response that `should_inspect` would accept.
    pub fn wants_body(&self, head: &ResponseHead) -> bool {
        match self.policy {
            FilterPolicy::ContentTypeOnly => {
                !head.resource_kind.is_static_asset() && head.is_json()
            }
            FilterPolicy::KeywordAndContentType => self.url_matches(&head.url),
        }
    }

    /// Full check including the body.
    pub fn should_inspect(&self, response: &RawResponse) -> bool {
        if !self.wants_body(&response.head) {
            return false;
        }
        match self.policy {
            FilterPolicy::ContentTypeOnly => true,
            FilterPolicy::KeywordAndContentType => {
                response.head.is_json() || parser::is_decodable(&response.body)
            }
        }
    }

    fn url_matches(&self, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        let url = url.to_lowercase();
        self.keywords.iter().any(|k| url.contains(k.as_str()))
    }
}
