use crate::redact::redact_tokens;
use serde_json::Value;

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Human-readable message from a backend error body.
///
/// Accepts a bare string, `{detail}`, `{message}`, or field errors shaped
/// like `{"amount": ["must be positive"], "campaign": ["required"]}` which
/// become `amount: must be positive | campaign: required`.
pub fn backend_message(data: &Value) -> Option<String> {
    let message = match data {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(detail) = map.get("detail").filter(|v| !v.is_null()) {
                value_text(detail)
            } else if let Some(message) = map.get("message").filter(|v| !v.is_null()) {
                value_text(message)
            } else {
                map.iter()
                    .map(|(field, value)| format!("{field}: {}", value_text(value)))
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
        }
        other => other.to_string(),
    };

    let message = message.trim();
    if message.is_empty() {
        None
    } else {
        Some(redact_tokens(message).into_owned())
    }
}

pub fn extract_error_message(data: Option<&Value>, fallback: &str) -> String {
    data.and_then(backend_message)
        .unwrap_or_else(|| fallback.to_string())
}
