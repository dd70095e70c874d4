//! Table statistics and numeric distributions for the overview screen

use super::{quote_ident, DataStore};
use crate::error::Result;
use crate::result::CellValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default number of histogram bins
pub const DEFAULT_BINS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub total_rows: u64,
    pub unique_values: u64,
    pub missing_values: u64,
}

/// Non-NULL values of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub table: String,
    pub column: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

fn cell_to_u64(cell: Option<&CellValue>) -> u64 {
    match cell {
        Some(CellValue::Integer(i)) if *i > 0 => *i as u64,
        _ => 0,
    }
}

/// Row count, distinct count and NULL count for every column of `table`.
pub fn table_statistics(store: &dyn DataStore, table: &str) -> Result<Vec<ColumnStats>> {
    let columns = store.describe_table(table)?;

    let mut select = vec!["COUNT(*)".to_string()];
    for col in &columns {
        let ident = quote_ident(&col.name);
        select.push(format!("COUNT(DISTINCT {})", ident));
        select.push(format!("SUM({} IS NULL)", ident));
    }
    let sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(table));

    let rows = store.execute_read_query(&sql)?;
    let row = rows.rows.first().cloned().unwrap_or_default();
    let total_rows = cell_to_u64(row.first());

    Ok(columns
        .iter()
        .enumerate()
        .map(|(i, col)| ColumnStats {
            column: col.name.clone(),
            total_rows,
            unique_values: cell_to_u64(row.get(1 + 2 * i)),
            missing_values: cell_to_u64(row.get(2 + 2 * i)),
        })
        .collect())
}

fn is_numeric_type(declared: &str) -> bool {
    matches!(declared.trim().to_uppercase().as_str(), "INTEGER" | "REAL")
}

/// Values of every `INTEGER`/`REAL` column across all user tables.
///
/// A table that fails to read is logged and skipped.
pub fn numeric_columns(store: &dyn DataStore) -> Result<Vec<NumericColumn>> {
    let mut out = Vec::new();

    for table in store.list_user_tables()? {
        let numeric: Vec<String> = store
            .describe_table(&table)?
            .into_iter()
            .filter(|c| is_numeric_type(&c.data_type))
            .map(|c| c.name)
            .collect();
        if numeric.is_empty() {
            continue;
        }

        let sql = format!(
            "SELECT {} FROM {}",
            numeric.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(&table)
        );
        let rows = match store.execute_read_query(&sql) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Error querying {}: {}", table, e);
                continue;
            }
        };

        for (i, column) in numeric.into_iter().enumerate() {
            let values = rows
                .rows
                .iter()
                .filter_map(|r| r.get(i).and_then(CellValue::as_f64))
                .collect();
            out.push(NumericColumn {
                table: table.clone(),
                column,
                values,
            });
        }
    }

    Ok(out)
}

/// Equal-width histogram over `values`. A zero-width range yields one bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut result: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for v in finite {
        // The maximum belongs to the last, closed bin
        let idx = (((v - min) / width) as usize).min(bins - 1);
        result[idx].count += 1;
    }

    result
}

/// Render a histogram as horizontal bars, `bar_width` characters at most.
pub fn render_histogram(bins: &[HistogramBin], bar_width: usize) -> String {
    let peak = bins.iter().map(|b| b.count).max().unwrap_or(0);
    let mut out = String::new();
    for bin in bins {
        let len = if peak == 0 { 0 } else { bin.count * bar_width / peak };
        out.push_str(&format!(
            "{:>12.3} .. {:<12.3} {:>6} {}\n",
            bin.lower,
            bin.upper,
            bin.count,
            "#".repeat(len)
        ));
    }
    out
}
