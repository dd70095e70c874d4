//! Schema introspection
//!
//! Reads every user table's columns from the store and renders them as
//! `CREATE TABLE` statements for the system prompt. The rendered document is
//! prompt material only and is never executed.

use crate::error::Result;
use crate::store::{quote_ident, ColumnDef, DataStore};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Render as a declarative statement, columns in declaration order.
    pub fn to_create_statement(&self) -> String {
        let column_defs = self
            .columns
            .iter()
            .map(|c| {
                if c.data_type.is_empty() {
                    quote_ident(&c.name)
                } else {
                    format!("{} {}", quote_ident(&c.name), c.data_type)
                }
            })
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            quote_ident(&self.name),
            column_defs
        )
    }
}

/// Every table schema of a store, recomputed per request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub tables: Vec<TableSchema>,
}

impl SchemaDocument {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(TableSchema::to_create_statement)
            .join("\n\n")
    }
}

impl fmt::Display for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build the schema document for `store`. An empty store yields an empty document.
pub fn introspect(store: &dyn DataStore) -> Result<SchemaDocument> {
    let tables: Vec<TableSchema> = store
        .describe_tables()?
        .into_iter()
        .map(|(name, columns)| TableSchema { name, columns })
        .collect();
    debug!("Introspected {} tables", tables.len());
    Ok(SchemaDocument { tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::test_support::temp_store;

    #[test]
    fn test_empty_store_gives_empty_document() {
        let store = temp_store("");
        let doc = introspect(&store).unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.render(), "");
    }

    #[test]
    fn test_orders_rendering() {
        let store = temp_store("CREATE TABLE orders (id INTEGER, amount REAL);");
        let doc = introspect(&store).unwrap();
        assert_eq!(
            doc.render(),
            "CREATE TABLE IF NOT EXISTS \"orders\" (\n    \"id\" INTEGER, \"amount\" REAL\n);"
        );
        let orders = doc.table("orders").unwrap();
        let names: Vec<&str> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "amount"]);
    }

    #[test]
    fn test_multiple_tables_separated_by_blank_line() {
        let store = temp_store(
            "CREATE TABLE b (x TEXT);
             CREATE TABLE a (y INTEGER);",
        );
        let rendered = introspect(&store).unwrap().render();
        let blocks: Vec<&str> = rendered.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("\"a\""));
        assert!(blocks[1].contains("\"b\""));
    }

    #[test]
    fn test_introspect_uses_batched_describe() {
        struct Batched;
        impl DataStore for Batched {
            fn list_user_tables(&self) -> Result<Vec<String>> {
                unreachable!()
            }
            fn describe_table(&self, _table: &str) -> Result<Vec<ColumnDef>> {
                unreachable!()
            }
            fn describe_tables(&self) -> Result<Vec<(String, Vec<ColumnDef>)>> {
                Ok(vec![("orders".to_string(), vec![ColumnDef::new("id", "INTEGER")])])
            }
            fn execute_read_query(&self, _sql: &str) -> Result<crate::result::QueryRows> {
                unreachable!()
            }
        }

        let doc = introspect(&Batched).unwrap();
        assert_eq!(doc.tables.len(), 1);
        assert!(doc.render().contains("\"id\" INTEGER"));
    }

    #[test]
    fn test_untyped_column() {
        let schema = TableSchema {
            name: "t".to_string(),
            columns: vec![ColumnDef::new("c", "")],
        };
        assert_eq!(schema.to_create_statement(), "CREATE TABLE IF NOT EXISTS \"t\" (\n    \"c\"\n);");
    }
}
