//! SQLite-backed data store
//!
//! Every operation opens its own short-lived connection and closes it on
//! return. Reads go through a read-only connection so that nothing executed
//! through `execute_read_query` can modify the file.

use super::{quote_ident, ColumnDef, DataStore};
use crate::error::{AssistantError, Result};
use crate::result::{CellValue, QueryRows};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

const LIST_USER_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Point at a database file. Nothing is opened until an operation runs.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create the database file (and its parent directory) if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(path);
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        store.open_read_write()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub(crate) fn open_read_only(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            AssistantError::Store(format!("Failed to open {}: {}", self.path.display(), e))
        })
    }

    pub(crate) fn open_read_write(&self) -> Result<Connection> {
        Connection::open(&self.path).map_err(|e| {
            AssistantError::Store(format!("Failed to open {}: {}", self.path.display(), e))
        })
    }
}

/// User tables visible through `conn`, in name order
pub(crate) fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(LIST_USER_TABLES)?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tables)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDef>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnDef::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(AssistantError::Store(format!(
            "Table not found: {}",
            quote_ident(table)
        )));
    }
    Ok(columns)
}

impl DataStore for SqliteStore {
    fn list_user_tables(&self) -> Result<Vec<String>> {
        if !self.exists() {
            debug!("Store {} does not exist yet; no tables", self.path.display());
            return Ok(Vec::new());
        }
        let conn = self.open_read_only()?;
        user_tables(&conn)
    }

    fn describe_table(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let conn = self.open_read_only()?;
        table_columns(&conn, table)
    }

    fn describe_tables(&self) -> Result<Vec<(String, Vec<ColumnDef>)>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let conn = self.open_read_only()?;
        user_tables(&conn)?
            .into_iter()
            .map(|table| {
                let columns = table_columns(&conn, &table)?;
                Ok((table, columns))
            })
            .collect()
    }

    fn execute_read_query(&self, sql: &str) -> Result<QueryRows> {
        let conn = self.open_read_only()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut result = QueryRows::new(columns);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(CellValue::from(row.get_ref(i)?));
            }
            result.rows.push(cells);
        }

        debug!("Query returned {} rows", result.row_count());
        Ok(result)
    }
}
