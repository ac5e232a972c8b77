//! Store behaviour seen from outside the crate: readers alongside a live writer,
//! restarts and the metadata table.

use chrono::NaiveDate;
use lab_logger::identity::{ConnectionSpec, EquipmentRecord};
use lab_logger::params::Params;
use lab_logger::sensors::{FieldSet, Reading};
use lab_logger::storage::query::{read, Query};
use lab_logger::storage::Storage;
use std::time::Duration;
use tempfile::TempDir;

fn record() -> EquipmentRecord {
    EquipmentRecord {
        manufacturer: "IsoTech".into(),
        model: "milliK".into(),
        serial: "MK-7".into(),
        alias: "Bath monitor".into(),
        connection: ConnectionSpec::tcp("10.1.1.5:4000")
            .with_properties(Params::new().with("channels", vec![1_i64, 2])),
    }
}

fn fields() -> FieldSet {
    FieldSet::floats(["channel1", "channel2"])
}

#[test]
fn reader_sees_rows_while_writer_is_open() {
    let dir = TempDir::new().unwrap();
    let mut storage = Storage::open(dir.path(), &record(), &fields(), Duration::from_secs(1)).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    for hour in 0..3 {
        let at = day.and_hms_opt(hour, 0, 0).unwrap();
        storage
            .write(&at, &Reading::new(vec![20.001 + f64::from(hour), 20.002]))
            .unwrap();

        let rows = read(storage.path(), &Query::default()).unwrap().rows;
        assert_eq!(rows.len() as u32, hour + 1);
    }
}

#[test]
fn restart_appends_to_existing_store() {
    let dir = TempDir::new().unwrap();
    let at = NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();

    {
        let mut storage = Storage::open(dir.path(), &record(), &fields(), Duration::from_secs(1)).unwrap();
        storage.write(&at, &Reading::new(vec![1.0, 2.0])).unwrap();
    }
    {
        let mut storage = Storage::open(dir.path(), &record(), &fields(), Duration::from_secs(1)).unwrap();
        storage.write(&at, &Reading::new(vec![3.0, 4.0])).unwrap();
    }

    let selection = read(&dir.path().join("MK-7.sqlite3"), &Query::default()).unwrap();
    let pids: Vec<i64> = selection.rows.iter().map(|r| r.pid).collect();
    assert_eq!(pids, [1, 2]);
}

#[test]
fn metadata_records_identity_once() {
    let dir = TempDir::new().unwrap();
    for _ in 0..3 {
        Storage::open(dir.path(), &record(), &fields(), Duration::from_secs(1)).unwrap();
    }

    let conn = rusqlite::Connection::open(dir.path().join("MK-7.sqlite3")).unwrap();
    let mut stmt = conn
        .prepare("SELECT field, value FROM metadata ORDER BY field")
        .unwrap();
    let pairs: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(pairs.len(), record().metadata().len());
    assert!(pairs.contains(&("alias".into(), "Bath monitor".into())));
    assert!(pairs
        .iter()
        .any(|(field, value)| field == "connection.properties.channels" && value.starts_with('[')));
}
