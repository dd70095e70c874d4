use crate::error::{AssistantError, Result};
use crate::prompt::{LABEL_FIELD, SQL_FIELD};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Label used when the model omits one
pub const UNKNOWN_LABEL: &str = "Unknown";

lazy_static! {
    static ref FENCE_REGEX: Regex = Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap();
}

/// Fields extracted from the model's JSON reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Raw SQL text; empty when the model returned none
    pub sql: String,
    pub label: String,
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    FENCE_REGEX
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

/// Parse the reply as a JSON object and pull out the SQL and label.
///
/// A missing SQL field is not an error: it comes back as an empty string for
/// the caller to detect. A missing label becomes [`UNKNOWN_LABEL`].
pub fn parse_response(raw: &str) -> Result<ParsedResponse> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AssistantError::Parse(format!("Failed to parse LLM response: {}. Response: {}", e, body)))?;

    let object = value
        .as_object()
        .ok_or_else(|| AssistantError::Parse(format!("Expected a JSON object, got: {}", body)))?;

    let sql = object
        .get(SQL_FIELD)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let label = object
        .get(LABEL_FIELD)
        .and_then(|v| v.as_str())
        .unwrap_or(UNKNOWN_LABEL)
        .to_string();

    Ok(ParsedResponse { sql, label })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_fields() {
        let parsed =
            parse_response(r#"{"sql_query":"select count(*) from orders","table_name":"order count"}"#)
                .unwrap();
        assert_eq!(parsed.sql, "select count(*) from orders");
        assert_eq!(parsed.label, "order count");
    }

    #[test]
    fn test_missing_sql_is_empty() {
        let parsed = parse_response(r#"{"table_name":"Totals"}"#).unwrap();
        assert_eq!(parsed.sql, "");
        assert_eq!(parsed.label, "Totals");
    }

    #[test]
    fn test_missing_label_defaults() {
        let parsed = parse_response(r#"{"sql_query":"select 1"}"#).unwrap();
        assert_eq!(parsed.label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_non_string_fields_degrade() {
        let parsed = parse_response(r#"{"sql_query":null,"table_name":42}"#).unwrap();
        assert_eq!(parsed.sql, "");
        assert_eq!(parsed.label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_fenced_json() {
        let parsed = parse_response("```json\n{\"sql_query\":\"select 1\",\"table_name\":\"One\"}\n```").unwrap();
        assert_eq!(parsed.sql, "select 1");
        assert_eq!(parsed.label, "One");
    }

    #[test]
    fn test_not_json_fails() {
        assert!(matches!(parse_response("SELECT * FROM orders"), Err(AssistantError::Parse(_))));
        assert!(matches!(parse_response(""), Err(AssistantError::Parse(_))));
    }

    #[test]
    fn test_non_object_fails() {
        assert!(matches!(parse_response(r#"["select 1"]"#), Err(AssistantError::Parse(_))));
    }
}
