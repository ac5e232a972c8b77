//! Read path for stores written by [`Storage`](super::Storage).
//!
//! Stateless: every call opens the file read-only, runs one query and closes
//! it again. Safe to use while the logger is appending.

use super::{format_timestamp, table_columns, FIXED_COLUMNS};
use crate::error::{AppResult, LoggerError};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::Serialize;
use serde_json::{Map, Number};
use std::path::Path;
use std::time::Duration;

/// Row selection
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Only rows at or after this time
    pub start: Option<NaiveDateTime>,
    /// Only rows strictly before this time
    pub end: Option<NaiveDateTime>,
    /// Field columns to return; all fields when `None`
    pub columns: Option<Vec<String>>,
}

/// One stored row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    /// Auto-increment row id
    pub pid: i64,
    /// Timestamp text as stored
    pub timestamp: String,
    /// Values of the selected columns; `None` for SQL NULL
    pub values: Vec<Option<f64>>,
}

/// Result of [`read`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Field columns, in the order of [`StoredRow::values`]
    pub columns: Vec<String>,
    /// Rows ordered by timestamp, then pid
    pub rows: Vec<StoredRow>,
}

impl Selection {
    /// Rows as JSON objects keyed by column name, `pid` and `datetime` first
    pub fn to_json_lines(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                object.insert("pid".into(), row.pid.into());
                object.insert("datetime".into(), row.timestamp.clone().into());
                for (name, value) in self.columns.iter().zip(&row.values) {
                    let json = value
                        .and_then(Number::from_f64)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number);
                    object.insert(name.clone(), json);
                }
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Read rows from the store at `path`.
///
/// # Errors
/// - `StoreNotFound` if `path` does not exist (nothing is created)
/// - `UnknownColumn` if a projected column is not a field of the store
/// - `Storage` on database failures
pub fn read(path: &Path, query: &Query) -> AppResult<Selection> {
    if !path.is_file() {
        return Err(LoggerError::StoreNotFound(path.to_path_buf()));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(Duration::from_secs(10))?;

    let fields: Vec<String> = table_columns(&conn, "data")?
        .into_iter()
        .filter(|c| !FIXED_COLUMNS.contains(&c.as_str()))
        .collect();

    let columns = match &query.columns {
        None => fields,
        Some(requested) => {
            for name in requested {
                if !fields.iter().any(|f| f == name) {
                    return Err(LoggerError::UnknownColumn(name.clone()));
                }
            }
            requested.clone()
        }
    };

    let mut sql = String::from("SELECT pid, datetime");
    for column in &columns {
        sql.push_str(", ");
        sql.push_str(column);
    }
    sql.push_str(" FROM data");

    let mut conditions = Vec::new();
    let mut bounds = Vec::new();
    if let Some(start) = &query.start {
        bounds.push(Value::Text(format_timestamp(start)));
        conditions.push(format!("datetime >= ?{}", bounds.len()));
    }
    if let Some(end) = &query.end {
        bounds.push(Value::Text(format_timestamp(end)));
        conditions.push(format!("datetime < ?{}", bounds.len()));
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY datetime ASC, pid ASC");

    let width = columns.len();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bounds), |row| {
            let values = (0..width)
                .map(|i| row.get::<_, Option<f64>>(i + 2))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StoredRow {
                pid: row.get(0)?,
                timestamp: row.get(1)?,
                values,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Selection { columns, rows })
}
