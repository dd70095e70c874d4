//! Prompt construction for SQL generation

use crate::schema::SchemaDocument;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// JSON field carrying the SQL statement
pub const SQL_FIELD: &str = "sql_query";

/// JSON field carrying the result label
pub const LABEL_FIELD: &str = "table_name";

/// System message instructing the model to answer with one read-only query.
pub fn build_system_prompt(schema: &SchemaDocument) -> ChatMessage {
    let schema_text = if schema.is_empty() {
        "(no tables)".to_string()
    } else {
        schema.render()
    };

    ChatMessage::system(format!(
        r#"You are an expert data analyst who writes clean, executable SQLite queries based on a given database schema and user request. Additionally, choose a short human-readable name for the result table.

## Rules:
- Respond with a JSON object containing exactly two fields:
    - "{sql}": a single valid SQL query string
    - "{label}": a suitable name for the result table (capitalize each word)
- Use only SELECT statements. Never write INSERT, UPDATE, DELETE, CREATE, DROP, ALTER, PRAGMA or any other statement that changes data or schema.
- Do NOT include commentary or any text outside the JSON object.
- Use only tables and columns from the schema below.

## Database schema:
{schema}"#,
        sql = SQL_FIELD,
        label = LABEL_FIELD,
        schema = schema_text,
    ))
}

/// The user-facing message: the question with surrounding whitespace
/// trimmed, otherwise verbatim. A refinement is sent together with the
/// question it refines, original question first.
pub fn compose_user_message(question: &str, refinement: Option<&str>) -> String {
    match refinement.map(str::trim).filter(|r| !r.is_empty()) {
        Some(refinement) => format!(
            "Original query: {}. Refinement: {}",
            question.trim(),
            refinement
        ),
        None => question.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;
    use crate::store::ColumnDef;

    fn orders_schema() -> SchemaDocument {
        SchemaDocument {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec![ColumnDef::new("id", "INTEGER"), ColumnDef::new("amount", "REAL")],
            }],
        }
    }

    #[test]
    fn test_system_prompt_contains_rules_and_schema() {
        let msg = build_system_prompt(&orders_schema());
        assert_eq!(msg.role, Role::System);
        assert!(msg.content.contains("\"sql_query\""));
        assert!(msg.content.contains("\"table_name\""));
        assert!(msg.content.contains("Use only SELECT statements"));
        assert!(msg.content.contains("Do NOT include commentary"));
        assert!(msg.content.contains("CREATE TABLE IF NOT EXISTS \"orders\""));
    }

    #[test]
    fn test_system_prompt_is_deterministic() {
        assert_eq!(build_system_prompt(&orders_schema()), build_system_prompt(&orders_schema()));
    }

    #[test]
    fn test_empty_schema_still_well_formed() {
        let msg = build_system_prompt(&SchemaDocument::default());
        assert!(msg.content.contains("## Database schema:\n(no tables)"));
    }

    #[test]
    fn test_compose_plain_question() {
        assert_eq!(compose_user_message("  how many orders  ", None), "how many orders");
        assert_eq!(compose_user_message("how many orders", Some("   ")), "how many orders");
    }

    #[test]
    fn test_compose_refinement_order() {
        let msg = compose_user_message("top 5 customers", Some("only from 2023"));
        assert_eq!(msg, "Original query: top 5 customers. Refinement: only from 2023");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
