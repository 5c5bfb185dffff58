//! Defensive parsing for classifier output.
//!
//! Guardrail models are asked for strict JSON but routinely wrap it in code
//! fences or prose. Every call site funnels through `parse_decision_json` so
//! the salvage rules stay identical across both guardrails.

use serde_json::Value;

/// Strip a leading/trailing markdown code fence, tolerating a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse classifier output into a JSON object. Tries the whole (fence-
/// stripped) text first, then the substring between the first `{` and the
/// last `}` to tolerate stray prose around the object.
pub fn parse_decision_json(text: &str) -> Option<Value> {
    let stripped = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<Value>(stripped)
        && value.is_object()
    {
        return Some(value);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&stripped[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Field accessors with the documented defaults. Missing or wrong-typed
/// fields never error; they fall back.
pub fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
