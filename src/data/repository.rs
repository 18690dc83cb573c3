use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::models::image_record::ImageRecord;

/// Replaces any prior record for the same path.
pub fn insert_image_record(conn: &Connection, record: &ImageRecord) -> Result<(), AppError> {
    let path = record.path.to_string_lossy();
    let annotations = serde_json::to_string(&record.annotations)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM image_annotations WHERE path = ?1",
        params![path],
    )?;
    tx.execute(
        "INSERT INTO image_annotations (path, last_modified_us, size_bytes, annotations)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            path,
            record.last_modified.timestamp_micros(),
            record.size_bytes as i64,
            annotations,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn delete_image_record(conn: &Connection, path: &str) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM image_annotations WHERE path = ?1",
        params![path],
    )?;
    Ok(count)
}

pub fn get_last_modified(conn: &Connection, path: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let micros: Option<i64> = conn
        .query_row(
            "SELECT last_modified_us FROM image_annotations WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;

    Ok(micros.and_then(DateTime::from_timestamp_micros))
}

pub fn get_image_record(conn: &Connection, path: &str) -> Result<Option<ImageRecord>, AppError> {
    let row: Option<(String, i64, i64, String)> = conn
        .query_row(
            "SELECT path, last_modified_us, size_bytes, annotations
             FROM image_annotations WHERE path = ?1",
            params![path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((path, micros, size_bytes, annotations)) = row else {
        return Ok(None);
    };

    let last_modified = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| AppError::General(format!("invalid timestamp for {path}: {micros}")))?;
    let annotations: BTreeSet<String> = serde_json::from_str(&annotations)?;

    Ok(Some(ImageRecord {
        path: PathBuf::from(path),
        last_modified,
        size_bytes: size_bytes.max(0) as u64,
        annotations,
    }))
}

pub fn list_indexed_paths(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT path FROM image_annotations ORDER BY path ASC")?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(paths)
}

/// Paths strictly below `directory`; `directory` itself never matches.
pub fn list_paths_under(conn: &Connection, directory: &str) -> Result<Vec<String>, AppError> {
    let prefix = format!("{}/", directory.trim_end_matches('/'));
    let mut stmt = conn.prepare(
        "SELECT path FROM image_annotations
         WHERE substr(path, 1, length(?1)) = ?1
         ORDER BY path ASC",
    )?;
    let paths = stmt
        .query_map(params![prefix], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(paths)
}

pub fn find_by_annotation(conn: &Connection, word: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT path FROM image_annotations
         WHERE EXISTS (SELECT 1 FROM json_each(image_annotations.annotations) WHERE value = ?1)
         ORDER BY path ASC",
    )?;
    let paths = stmt
        .query_map(params![word.to_lowercase()], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(paths)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, AppError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

// Needed for rusqlite optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
