//! Coercion and plausibility filtering of candidate points.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{AliasPolicy, TapConfig};
use crate::extract::is_falsy;
use crate::types::{CandidatePoint, DataPoint};

/// Text format of the capture instant (UTC, microsecond precision, no offset).
pub const CAPTURE_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format a capture instant.
pub fn capture_instant(now: DateTime<Utc>) -> String {
    now.format(CAPTURE_INSTANT_FORMAT).to_string()
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Timestamp or value absent (or falsy under the falsy policy).
    Missing,
    /// Value does not coerce to an integer.
    NotNumeric,
    /// Value is not above the plausibility threshold.
    BelowThreshold(i64),
}

/// Turns candidates into storable points.
#[derive(Debug, Clone)]
pub struct Normalizer {
    threshold: i64,
    alias_policy: AliasPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&TapConfig::default())
    }
}

impl Normalizer {
    pub fn from_config(config: &TapConfig) -> Self {
        Self {
            threshold: config.threshold,
            alias_policy: config.alias_policy,
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Validate a candidate and build a point stamped with `captured_at`.
    pub fn normalize(
        &self,
        candidate: &CandidatePoint<'_>,
        captured_at: &str,
    ) -> Result<DataPoint, Rejection> {
        let (Some(raw_ts), Some(raw_value)) = (
            candidate.timestamp.filter(|v| self.is_present(v)),
            candidate.value.filter(|v| self.is_present(v)),
        ) else {
            return Err(Rejection::Missing);
        };

        let value = coerce_integer(raw_value).ok_or(Rejection::NotNumeric)?;
        if value <= self.threshold {
            return Err(Rejection::BelowThreshold(value));
        }

        Ok(DataPoint {
            timestamp: timestamp_text(raw_ts),
            value,
            captured_at: captured_at.to_string(),
        })
    }

    fn is_present(&self, value: &Value) -> bool {
        match self.alias_policy {
            AliasPolicy::SkipFalsy => !is_falsy(value),
            AliasPolicy::PresenceOnly => !value.is_null(),
        }
    }
}

/// Float conversion followed by truncation toward zero.
fn coerce_integer(value: &Value) -> Option<i64> {
    let float = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };

    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if !float.is_finite() || float < i64::MIN as f64 || float >= i64::MAX as f64 {
        return None;
    }
    Some(float.trunc() as i64)
}

/// Verbatim string form of a timestamp token.
fn timestamp_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
