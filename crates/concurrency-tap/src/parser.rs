//! Tolerant decoding of response bodies into structured values.

use serde_json::Value;

/// Prefixes some APIs put in front of JSON to block cross-site inclusion.
const GUARD_PREFIXES: &[&str] = &[")]}'", "while(1);", "for(;;);"];

/// Why a body could not be decoded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty body")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Decode a body into a structured value.
///
/// When the content-type hint mentions JSON a strict decode is tried first.
/// Otherwise, or when the strict decode fails, a best-effort decode of the
/// raw text is attempted.
pub fn parse(body: &str, content_type: Option<&str>) -> Result<Value, DecodeError> {
    let json_hint = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    if json_hint {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return Ok(value);
        }
    }

    best_effort(body)
}

/// True when the body decodes to a structured value by any route.
pub fn is_decodable(body: &str) -> bool {
    best_effort(body).is_ok()
}

fn best_effort(body: &str) -> Result<Value, DecodeError> {
    let mut text = body.trim_start_matches('\u{feff}').trim();
    for prefix in GUARD_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
            break;
        }
    }

    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(e) => unwrap_jsonp(text)
            .and_then(|inner| serde_json::from_str::<Value>(inner).ok())
            .ok_or_else(|| DecodeError::Malformed(e.to_string())),
    }
}

/// `callback({...});` → `{...}`
fn unwrap_jsonp(text: &str) -> Option<&str> {
    let open = text.find('(')?;
    let name = text[..open].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    {
        return None;
    }

    let text = text.trim_end().trim_end_matches(';').trim_end();
    text.get(open + 1..)?.strip_suffix(')')
}
