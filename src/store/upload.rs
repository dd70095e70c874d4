//! CSV upload
//!
//! Replaces the whole contents of a store with one table read from a CSV
//! file. Column types are inferred from the data: a column whose non-empty
//! cells all parse as integers is `INTEGER`, as numbers is `REAL`, otherwise
//! `TEXT`. Empty cells are stored as NULL.

use super::sqlite::{user_tables, SqliteStore};
use super::{quote_ident, ColumnDef};
use crate::error::{AssistantError, Result};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredType {
    Integer,
    Real,
    Text,
}

impl InferredType {
    fn declared(self) -> &'static str {
        match self {
            InferredType::Integer => "INTEGER",
            InferredType::Real => "REAL",
            InferredType::Text => "TEXT",
        }
    }

    /// Widen the current guess so that it also admits `cell`.
    fn widen(self, cell: &str) -> Self {
        match self {
            InferredType::Integer if cell.parse::<i64>().is_ok() => InferredType::Integer,
            InferredType::Integer | InferredType::Real if cell.parse::<f64>().is_ok() => {
                InferredType::Real
            }
            _ => InferredType::Text,
        }
    }

    fn convert(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            InferredType::Integer => cell
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            InferredType::Real => cell
                .parse::<f64>()
                .map(Value::Real)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            InferredType::Text => Value::Text(cell.to_string()),
        }
    }
}

fn infer_types(width: usize, records: &[csv::StringRecord]) -> Vec<InferredType> {
    (0..width)
        .map(|i| {
            let mut seen_value = false;
            let mut ty = InferredType::Integer;
            for cell in records.iter().filter_map(|r| r.get(i)).map(str::trim) {
                if cell.is_empty() {
                    continue;
                }
                seen_value = true;
                ty = ty.widen(cell);
                if ty == InferredType::Text {
                    break;
                }
            }
            if seen_value {
                ty
            } else {
                InferredType::Text
            }
        })
        .collect()
}

/// Column names SQLite will accept: blanks become `column_N` and repeats
/// (compared case-insensitively) get a `_2`, `_3`, ... suffix.
fn unique_column_names(headers: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let base = if header.is_empty() {
                format!("column_{}", i + 1)
            } else {
                header.clone()
            };
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

impl SqliteStore {
    /// Drop every user table, then load `csv_path` as `table_name`.
    pub fn replace_with_csv(&self, csv_path: impl AsRef<Path>, table_name: &str) -> Result<UploadSummary> {
        let file = std::fs::File::open(csv_path.as_ref())?;
        self.replace_with_csv_reader(file, table_name)
    }

    /// Same as [`replace_with_csv`](Self::replace_with_csv) for any reader.
    pub fn replace_with_csv_reader<R: Read>(&self, reader: R, table_name: &str) -> Result<UploadSummary> {
        let table_name = table_name.trim();
        if table_name.is_empty() {
            return Err(AssistantError::Upload("Table name is required".to_string()));
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(AssistantError::Upload("CSV has no header row".to_string()));
        }
        let headers = unique_column_names(&headers);
        let records = csv_reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let types = infer_types(headers.len(), &records);
        let columns: Vec<ColumnDef> = headers
            .iter()
            .zip(&types)
            .map(|(name, ty)| ColumnDef::new(name.clone(), ty.declared()))
            .collect();

        let mut conn = self.open_read_write()?;
        let tx = conn.transaction()?;

        for existing in user_tables(&tx)? {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&existing)), [])?;
        }

        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(table_name), column_defs),
            [],
        )?;

        {
            let placeholders = vec!["?"; columns.len()].join(", ");
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(table_name),
                placeholders
            ))?;
            for record in &records {
                let values = types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| ty.convert(record.get(i).unwrap_or("").trim()));
                insert.execute(rusqlite::params_from_iter(values))?;
            }
        }

        tx.commit()?;

        info!(
            "Uploaded {} rows into {} ({} columns)",
            records.len(),
            quote_ident(table_name),
            columns.len()
        );

        Ok(UploadSummary {
            table_name: table_name.to_string(),
            columns,
            row_count: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::CellValue;
    use crate::store::sqlite::test_support::temp_store;
    use crate::store::DataStore;

    const CSV: &str = "id,amount,city,note\n1,2.5,Oslo,\n2,3,Bergen,x\n3,,Oslo,\n";

    #[test]
    fn test_infers_column_types() {
        let store = temp_store("");
        let summary = store.replace_with_csv_reader(CSV.as_bytes(), "sales").unwrap();
        assert_eq!(summary.row_count, 3);
        assert_eq!(
            summary.columns,
            vec![
                ColumnDef::new("id", "INTEGER"),
                ColumnDef::new("amount", "REAL"),
                ColumnDef::new("city", "TEXT"),
                ColumnDef::new("note", "TEXT"),
            ]
        );
        assert_eq!(store.describe_table("sales").unwrap(), summary.columns);
    }

    #[test]
    fn test_empty_cells_become_null() {
        let store = temp_store("");
        store.replace_with_csv_reader(CSV.as_bytes(), "sales").unwrap();
        let rows = store
            .execute_read_query("SELECT amount FROM sales WHERE id = 3")
            .unwrap();
        assert_eq!(rows.rows, vec![vec![CellValue::Null]]);
    }

    #[test]
    fn test_upload_wipes_existing_tables() {
        let store = temp_store(
            "CREATE TABLE old_a (x INTEGER);
             CREATE TABLE old_b (y TEXT);",
        );
        store.replace_with_csv_reader(CSV.as_bytes(), "sales").unwrap();
        assert_eq!(store.list_user_tables().unwrap(), vec!["sales".to_string()]);
    }

    #[test]
    fn test_duplicate_and_blank_headers_are_renamed() {
        let store = temp_store("");
        let csv = "a,A,a,,b\n1,2,3,4,x\n";
        let summary = store.replace_with_csv_reader(csv.as_bytes(), "t").unwrap();
        let names: Vec<&str> = summary.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "A_2", "a_3", "column_4", "b"]);

        let rows = store.execute_read_query("SELECT * FROM t").unwrap();
        assert_eq!(rows.columns, vec!["a", "A_2", "a_3", "column_4", "b"]);
        assert_eq!(rows.rows[0][2], CellValue::Integer(3));
    }

    #[test]
    fn test_rejects_blank_table_name() {
        let store = temp_store("");
        let err = store.replace_with_csv_reader(CSV.as_bytes(), "  ").unwrap_err();
        assert!(matches!(err, AssistantError::Upload(_)));
    }
}
