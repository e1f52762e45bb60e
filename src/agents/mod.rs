pub mod dates;
pub mod prescription;
pub mod summary;
pub mod template;

pub use dates::*;
pub use prescription::*;
pub use summary::*;
pub use template::*;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::GatewayError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("document has no extracted page text")]
    NoPageText,

    #[error("model response violates the expected schema: {0}")]
    SchemaViolation(String),

    #[error("Model gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Page text handed to the agents: the per-page mapping the model must
/// reference when attributing findings to pages.
#[derive(Debug, Clone, Serialize)]
pub struct PageText {
    pub page_number: i64,
    pub content: String,
}

/// Parse a model response that should be JSON, tolerating a markdown code
/// fence around it. Anything else is a schema violation, never guessed at.
pub(crate) fn parse_json_response(response: &str) -> Result<Value, AnalysisError> {
    let body = strip_code_fence(response);
    serde_json::from_str(body)
        .map_err(|e| AnalysisError::SchemaViolation(format!("invalid JSON: {e}")))
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

/// Project an untrusted JSON value to trimmed non-empty text: scalars to
/// their string form, composites (list/object) to serialized JSON. Empty
/// strings and empty composites count as "no value".
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) if items.is_empty() => return None,
        Value::Object(map) if map.is_empty() => return None,
        composite => serde_json::to_string(composite).ok()?,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Lenient page number: an integer, or a string containing one.
pub(crate) fn value_to_page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_parses() {
        let value = parse_json_response(r#"{"medications": []}"#).unwrap();
        assert!(value["medications"].is_array());
    }

    #[test]
    fn fenced_json_parses() {
        let response = "Here you go:\n```json\n{\"medications\": []}\n```\nDone.";
        let value = parse_json_response(response).unwrap();
        assert!(value["medications"].is_array());
    }

    #[test]
    fn bare_fence_parses() {
        let value = parse_json_response("```\n[1, 2]\n```").unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn garbage_is_schema_violation() {
        let err = parse_json_response("I could not find any medications.").unwrap_err();
        assert!(matches!(err, AnalysisError::SchemaViolation(_)));
    }

    #[test]
    fn text_projection() {
        assert_eq!(value_to_text(&json!("  spaced  ")).as_deref(), Some("spaced"));
        assert_eq!(value_to_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(value_to_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(value_to_text(&json!("")), None);
        assert_eq!(value_to_text(&json!("   ")), None);
        assert_eq!(value_to_text(&Value::Null), None);
    }

    #[test]
    fn composite_values_serialized() {
        assert_eq!(
            value_to_text(&json!(["a", "b"])).as_deref(),
            Some(r#"["a","b"]"#)
        );
        assert_eq!(
            value_to_text(&json!({"dose": "5mg"})).as_deref(),
            Some(r#"{"dose":"5mg"}"#)
        );
        assert_eq!(value_to_text(&json!([])), None);
        assert_eq!(value_to_text(&json!({})), None);
    }

    #[test]
    fn page_number_projection() {
        assert_eq!(value_to_page_number(&json!(3)), Some(3));
        assert_eq!(value_to_page_number(&json!("2")), Some(2));
        assert_eq!(value_to_page_number(&json!(" 4 ")), Some(4));
        assert_eq!(value_to_page_number(&json!("two")), None);
        assert_eq!(value_to_page_number(&json!(null)), None);
    }
}
