//! Message-text extraction from inbound request envelopes.
//!
//! Clients send message content in several shapes: a bare string, an ordered
//! list of typed parts, or a single typed part. Only `text` parts contribute.
//! Anything unrecognised yields an empty string.

use serde_json::Value;

/// Extract the text of a single `content` value.
pub fn extract_content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(text_part)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => text_part(content).map(str::to_string).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Extract all message text from request params.
///
/// Looks at `params.messages[*].content` first, then `params.content`.
pub fn extract_message_text(params: Option<&Value>) -> String {
    let Some(params) = params else {
        return String::new();
    };

    if let Some(messages) = params.get("messages").and_then(Value::as_array) {
        return messages
            .iter()
            .filter_map(|m| m.get("content"))
            .map(extract_content_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }

    params
        .get("content")
        .map(extract_content_text)
        .unwrap_or_default()
}

fn text_part(part: &Value) -> Option<&str> {
    if part.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    part.get("text").and_then(Value::as_str)
}
