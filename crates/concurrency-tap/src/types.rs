//! Core data types for captured responses, candidate points, and stored points.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource type tag reported by the browser for a network response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Font,
    Script,
    Media,
    Xhr,
    Fetch,
    Other,
}

impl ResourceKind {
    /// Static assets that never carry chart data.
    pub fn is_static_asset(self) -> bool {
        matches!(self, Self::Image | Self::Stylesheet | Self::Font)
    }
}

/// Everything known about a response before its body is fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHead {
    /// Request URL. Empty when the browser did not report one.
    pub url: String,
    pub content_type: Option<String>,
    pub resource_kind: ResourceKind,
    pub status: u16,
}

impl ResponseHead {
    /// True when the content type mentions JSON (case-insensitive).
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// A captured network response with its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub head: ResponseHead,
    pub body: String,
}

impl RawResponse {
    pub fn new(head: ResponseHead, body: impl Into<String>) -> Self {
        Self {
            head,
            body: body.into(),
        }
    }
}

/// An unvalidated (timestamp, value) pair borrowed from a decoded payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePoint<'a> {
    pub timestamp: Option<&'a Value>,
    pub value: Option<&'a Value>,
}

/// A validated, normalized point as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Verbatim string form of the source timestamp token.
    pub timestamp: String,
    pub value: i64,
    /// UTC capture instant, `%Y-%m-%dT%H:%M:%S%.6f`.
    pub captured_at: String,
}

/// Errors that can occur in the capture library.
#[derive(thiserror::Error, Debug)]
pub enum TapError {
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Illegal session transition: {from:?} -> {to:?}")]
    Phase {
        from: crate::session::SessionPhase,
        to: crate::session::SessionPhase,
    },

    #[error("Snapshot already exported")]
    AlreadyExported,
}

/// Convenience result type.
pub type TapResult<T> = Result<T, TapError>;
