//! Inbound body decoding shared by the HTTP and serverless adapters.
//!
//! The platform delivers three body encodings: plain JSON (Events API),
//! form-encoded key/value fields (slash commands), and a form-encoded
//! `payload` field wrapping a JSON document (interactive components). All
//! three decode to one canonical JSON object before classification.

use serde_json::{Map, Value};

use crate::error::{TransportError, TransportResult};

/// Decodes an inbound body to the canonical JSON payload.
///
/// An empty body, or a body that claims JSON but fails to parse, is
/// rejected here, before anything reaches the dispatcher.
pub fn parse_body(content_type: Option<&str>, bytes: &[u8]) -> TransportResult<Value> {
    if bytes.is_empty() {
        return Err(TransportError::payload("empty request body"));
    }

    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    if content_type.contains("application/x-www-form-urlencoded") {
        return parse_form(bytes);
    }

    // JSON either by content type or by default.
    serde_json::from_slice(bytes)
        .map_err(|e| TransportError::payload(format!("body is not valid JSON: {e}")))
}

/// Decodes a form-encoded body. A lone `payload` field is unwrapped to its
/// inner JSON document; anything else becomes an object of string fields.
fn parse_form(bytes: &[u8]) -> TransportResult<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TransportError::payload(format!("body is not valid UTF-8: {e}")))?;

    let mut fields = Map::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key)?;
        let value = decode_component(value)?;
        fields.insert(key, Value::String(value));
    }

    if let Some(Value::String(inner)) = fields.get("payload") {
        if fields.len() == 1 {
            return serde_json::from_str(inner)
                .map_err(|e| TransportError::payload(format!("payload field is not valid JSON: {e}")));
        }
    }

    Ok(Value::Object(fields))
}

fn decode_component(raw: &str) -> TransportResult<String> {
    // Form encoding spells spaces as '+', which percent-decoding alone
    // does not undo.
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .map_err(|e| TransportError::payload(format!("invalid form encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_parses() {
        let value = parse_body(Some("application/json"), br#"{"event":{"type":"x"}}"#).unwrap();
        assert_eq!(value, json!({"event": {"type": "x"}}));
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(parse_body(Some("application/json"), b"").is_err());
    }

    #[test]
    fn json_claiming_body_that_fails_to_parse_is_rejected() {
        let err = parse_body(Some("application/json"), b"{not json").unwrap_err();
        assert!(matches!(err, TransportError::Payload(_)));
    }

    #[test]
    fn command_form_fields_become_an_object() {
        let body = b"command=%2Fdeploy&text=prod+now&user_id=U1";
        let value = parse_body(Some("application/x-www-form-urlencoded"), body).unwrap();
        assert_eq!(value["command"], json!("/deploy"));
        assert_eq!(value["text"], json!("prod now"));
        assert_eq!(value["user_id"], json!("U1"));
    }

    #[test]
    fn payload_field_is_unwrapped() {
        let inner = r#"{"type":"block_actions","actions":[]}"#;
        let body = format!("payload={}", urlencoding::encode(inner));
        let value =
            parse_body(Some("application/x-www-form-urlencoded"), body.as_bytes()).unwrap();
        assert_eq!(value["type"], json!("block_actions"));
    }

    #[test]
    fn missing_content_type_defaults_to_json() {
        let value = parse_body(None, br#"{"type":"url_verification"}"#).unwrap();
        assert_eq!(value["type"], json!("url_verification"));
    }
}
