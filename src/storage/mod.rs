//! Append-only per-instrument store.
//!
//! Every instrument gets one SQLite file, `<log_dir>/<serial>.sqlite3`, with two
//! tables:
//!
//! ```sql
//! CREATE TABLE data (
//!     pid INTEGER PRIMARY KEY AUTOINCREMENT,
//!     datetime DATETIME,
//!     <field> REAL, ...                -- one column per sensor field, in order
//! );
//! CREATE TABLE metadata (
//!     datetime DATETIME,               -- when the pair was first recorded
//!     field TEXT,
//!     value TEXT,
//!     UNIQUE(field, value)
//! );
//! ```
//!
//! Rows are only ever appended. The file is opened in WAL mode so readers
//! (see [`query`]) never block the logger. Timestamps are local time written as
//! `YYYY-MM-DDTHH:MM:SS.ffffff`, which sorts lexicographically.

pub mod query;

use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use crate::sensors::{FieldSet, Reading};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Format of the `datetime` columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// File extension of store files
pub const EXTENSION: &str = "sqlite3";

/// Columns every data table has before the sensor fields
const FIXED_COLUMNS: [&str; 2] = ["pid", "datetime"];

/// Format a timestamp the way it is stored
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Current local time, as recorded for a reading
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Path of the store for `serial` inside `dir`
pub fn store_path(dir: &Path, serial: &str) -> PathBuf {
    dir.join(format!("{serial}.{EXTENSION}"))
}

/// Whether `name` can be used unquoted as a column name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_serial(serial: &str) -> AppResult<()> {
    let plain = !serial.is_empty()
        && serial != "."
        && serial != ".."
        && !serial.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(LoggerError::Configuration(format!(
            "serial '{serial}' cannot be used as a file name"
        )))
    }
}

/// Open a connection in WAL mode with the given busy timeout
pub(crate) fn configure(conn: &Connection, timeout: Duration) -> AppResult<()> {
    conn.busy_timeout(timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
    debug!(journal_mode = %mode, "store opened");
    Ok(())
}

/// Column names of `table`, in declaration order; empty if the table is missing
pub(crate) fn table_columns(conn: &Connection, table: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Writable handle on one instrument's store
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
    path: PathBuf,
    fields: FieldSet,
    insert_sql: String,
}

impl Storage {
    /// Open (creating if needed) the store for `record` in `dir`.
    ///
    /// Creates both tables if missing and records the identity metadata. Pairs
    /// already present are left alone, so reopening never duplicates them.
    ///
    /// # Errors
    /// - `Configuration` if the serial is not a plain file name or a field is
    ///   not a plain identifier
    /// - `Contract` if the existing data table has different columns
    /// - `Storage` / `Io` on database or file-system failures
    pub fn open(
        dir: &Path,
        record: &EquipmentRecord,
        fields: &FieldSet,
        timeout: Duration,
    ) -> AppResult<Self> {
        check_serial(&record.serial)?;
        if fields.is_empty() {
            return Err(LoggerError::Contract(format!(
                "sensor for {} declares no fields",
                record.serial
            )));
        }
        for name in fields.names() {
            if !is_identifier(name) || FIXED_COLUMNS.contains(&name) {
                return Err(LoggerError::Configuration(format!(
                    "'{name}' cannot be used as a column name"
                )));
            }
        }

        std::fs::create_dir_all(dir)?;
        let path = store_path(dir, &record.serial);
        let conn = Connection::open(&path)?;
        configure(&conn, timeout)?;

        let storage = Self {
            conn,
            insert_sql: insert_statement(fields),
            path,
            fields: fields.clone(),
        };
        storage.create_tables()?;
        storage.record_metadata(&record.metadata())?;

        info!(path = %storage.path.display(), fields = fields.len(), "store ready");
        Ok(storage)
    }

    fn create_tables(&self) -> AppResult<()> {
        let existing = table_columns(&self.conn, "data")?;
        if existing.is_empty() {
            let columns: Vec<String> = self
                .fields
                .iter()
                .map(|f| format!("{} {}", f.name, f.kind.sql_type()))
                .collect();
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS data (pid INTEGER PRIMARY KEY AUTOINCREMENT, datetime DATETIME, {})",
                    columns.join(", ")
                ),
                [],
            )?;
        } else {
            let expected: BTreeSet<&str> = FIXED_COLUMNS
                .iter()
                .copied()
                .chain(self.fields.names())
                .collect();
            let found: BTreeSet<&str> = existing.iter().map(String::as_str).collect();
            if expected != found {
                return Err(LoggerError::Contract(format!(
                    "{} has columns {existing:?}, sensor produces {:?}",
                    self.path.display(),
                    self.fields.names().collect::<Vec<_>>()
                )));
            }
        }

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (datetime DATETIME, field TEXT, value TEXT, UNIQUE(field, value))",
            [],
        )?;
        Ok(())
    }

    fn record_metadata(&self, pairs: &[(String, String)]) -> AppResult<()> {
        let stamp = format_timestamp(&now());
        let mut stmt = self
            .conn
            .prepare("INSERT OR IGNORE INTO metadata (datetime, field, value) VALUES (?1, ?2, ?3)")?;
        let mut added = 0;
        for (field, value) in pairs {
            added += stmt.execute((&stamp, field, value))?;
        }
        debug!(added, total = pairs.len(), "metadata recorded");
        Ok(())
    }

    /// Append one reading.
    ///
    /// # Errors
    /// `Contract` if the reading width differs from the field set; nothing is
    /// written in that case.
    pub fn write(&mut self, timestamp: &NaiveDateTime, reading: &Reading) -> AppResult<()> {
        if reading.len() != self.fields.len() {
            return Err(LoggerError::Contract(format!(
                "reading has {} values but {} declares {} fields",
                reading.len(),
                self.path.display(),
                self.fields.len()
            )));
        }

        let stamp = format_timestamp(timestamp);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.insert_sql)?;
            let values = std::iter::once(rusqlite::types::Value::Text(stamp))
                .chain(reading.values().iter().map(|v| rusqlite::types::Value::Real(*v)));
            stmt.execute(params_from_iter(values))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fields the store was opened for
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

fn insert_statement(fields: &FieldSet) -> String {
    let names: Vec<&str> = fields.names().collect();
    let placeholders: Vec<String> = (2..=names.len() + 1).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO data (datetime, {}) VALUES (?1, {})",
        names.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ConnectionSpec;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(serial: &str) -> EquipmentRecord {
        EquipmentRecord {
            manufacturer: "OMEGA".into(),
            model: "iTHX-W3".into(),
            serial: serial.into(),
            alias: "Lab".into(),
            connection: ConnectionSpec::tcp("10.0.0.1:2000"),
        }
    }

    fn fields() -> FieldSet {
        FieldSet::floats(["temperature", "humidity", "dewpoint"])
    }

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 0, second, 250)
            .unwrap()
    }

    fn count(storage: &Storage, table: &str) -> i64 {
        storage
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn opens_in_wal_mode_with_expected_schema() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path(), &record("123"), &fields(), Duration::from_secs(1)).unwrap();

        assert_eq!(storage.path(), dir.path().join("123.sqlite3"));
        let mode: String = storage
            .conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        assert_eq!(
            table_columns(&storage.conn, "data").unwrap(),
            ["pid", "datetime", "temperature", "humidity", "dewpoint"]
        );
    }

    #[test]
    fn rows_are_appended_in_order() {
        let dir = TempDir::new().unwrap();
        let mut storage = Storage::open(dir.path(), &record("123"), &fields(), Duration::from_secs(1)).unwrap();

        for i in 0..5 {
            let v = f64::from(i);
            storage.write(&at(i), &Reading::new(vec![20.0 + v, 40.0, 9.0])).unwrap();
        }

        let mut stmt = storage
            .conn
            .prepare("SELECT pid, datetime, temperature FROM data ORDER BY pid")
            .unwrap();
        let rows: Vec<(i64, String, f64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], (1, "2024-03-01T12:00:00.000250".to_string(), 20.0));
        assert_eq!(rows[4].2, 24.0);
    }

    #[test]
    fn wrong_arity_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut storage = Storage::open(dir.path(), &record("123"), &fields(), Duration::from_secs(1)).unwrap();

        let err = storage.write(&at(0), &Reading::new(vec![20.0, 40.0])).unwrap_err();
        assert!(matches!(err, LoggerError::Contract(_)));
        assert_eq!(count(&storage, "data"), 0);
    }

    #[test]
    fn reopening_does_not_duplicate_metadata() {
        let dir = TempDir::new().unwrap();
        let rec = record("123");
        let first = Storage::open(dir.path(), &rec, &fields(), Duration::from_secs(1)).unwrap();
        let pairs = count(&first, "metadata");
        assert_eq!(pairs, rec.metadata().len() as i64);
        drop(first);

        let second = Storage::open(dir.path(), &rec, &fields(), Duration::from_secs(1)).unwrap();
        assert_eq!(count(&second, "metadata"), pairs);

        // A changed alias adds exactly one new pair
        let mut renamed = rec.clone();
        renamed.alias = "Lab (moved)".into();
        let third = Storage::open(dir.path(), &renamed, &fields(), Duration::from_secs(1)).unwrap();
        assert_eq!(count(&third, "metadata"), pairs + 1);
    }

    #[test]
    fn different_field_set_is_refused() {
        let dir = TempDir::new().unwrap();
        drop(Storage::open(dir.path(), &record("123"), &fields(), Duration::from_secs(1)).unwrap());

        let two_probe = FieldSet::floats(["temperature1", "humidity1", "dewpoint1"]);
        let err = Storage::open(dir.path(), &record("123"), &two_probe, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LoggerError::Contract(_)));
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let bad_serial = Storage::open(dir.path(), &record("../x"), &fields(), Duration::from_secs(1));
        assert!(matches!(bad_serial, Err(LoggerError::Configuration(_))));

        let bad_field = FieldSet::floats(["temp; DROP TABLE data"]);
        let err = Storage::open(dir.path(), &record("123"), &bad_field, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LoggerError::Configuration(_)));

        let reserved = FieldSet::floats(["datetime"]);
        assert!(Storage::open(dir.path(), &record("123"), &reserved, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        Storage::open(&nested, &record("123"), &fields(), Duration::from_secs(1)).unwrap();
        assert!(nested.join("123.sqlite3").exists());
    }
}
