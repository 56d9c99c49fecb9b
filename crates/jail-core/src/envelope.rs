//! String envelopes returned by the registry's top-level operations.
//!
//! Every call produces either `{"result": <json>}` or `{"error": "<message>"}`;
//! failures never escape as host-level errors.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct ResultEnvelope<'a> {
    result: &'a Value,
}

pub fn make_error(message: &str) -> String {
    serde_json::to_string(&ErrorEnvelope { error: message })
        .unwrap_or_else(|_| r#"{"error":"failed to encode error envelope"}"#.to_string())
}

pub fn make_result(result: &Value) -> String {
    match serde_json::to_string(&ResultEnvelope { result }) {
        Ok(text) => text,
        Err(error) => make_error(&error.to_string()),
    }
}

/// Wraps script-produced text. `undefined` becomes `null`; text that is not
/// JSON is embedded as a JSON string.
pub fn make_result_text(text: &str) -> String {
    if text == "undefined" {
        return make_result(&Value::Null);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => make_result(&value),
        Err(_) => make_result(&Value::String(text.to_string())),
    }
}
