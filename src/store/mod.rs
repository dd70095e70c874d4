//! Data store boundary
//!
//! The translation pipeline only depends on the `DataStore` capability set:
//! list user tables, describe a table's columns, execute a read query.
//! `SqliteStore` is the file-backed implementation; upload, statistics and
//! numeric distributions are collaborators built on top of it.

pub mod sqlite;
pub mod stats;
pub mod upload;

pub use sqlite::SqliteStore;
pub use stats::{histogram, ColumnStats, HistogramBin, NumericColumn};
pub use upload::UploadSummary;

use crate::error::Result;
use crate::result::QueryRows;
use serde::{Deserialize, Serialize};

/// A column as declared in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Capability set the pipeline needs from a relational store
pub trait DataStore: Send + Sync {
    /// User-defined tables, excluding internal tables, in name order
    fn list_user_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` in declaration order
    fn describe_table(&self, table: &str) -> Result<Vec<ColumnDef>>;

    /// Every user table with its columns, in table name order.
    ///
    /// The default asks `describe_table` once per table; stores that can
    /// answer from a single connection override it.
    fn describe_tables(&self) -> Result<Vec<(String, Vec<ColumnDef>)>> {
        self.list_user_tables()?
            .into_iter()
            .map(|table| {
                let columns = self.describe_table(&table)?;
                Ok((table, columns))
            })
            .collect()
    }

    /// Execute a read query and collect every row
    fn execute_read_query(&self, sql: &str) -> Result<QueryRows>;
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
