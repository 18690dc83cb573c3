use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::data::{migrations, repository};
use crate::error::AppError;
use crate::models::image_record::ImageRecord;

/// Durable annotation index consumed by the scheduler.
///
/// Calls are short and synchronous; the scheduler issues at most one mutation
/// at a time, so implementations need no ordering of their own.
pub trait AnnotationStore: Send + Sync {
    /// Writes `record`, replacing any prior record for the same path.
    fn insert(&self, record: &ImageRecord) -> Result<(), AppError>;
    fn remove(&self, path: &Path) -> Result<(), AppError>;
    fn get_last_modified_time(&self, path: &Path) -> Result<Option<DateTime<Utc>>, AppError>;
    fn get_all_files(&self) -> Result<Vec<PathBuf>, AppError>;
    /// Every indexed path strictly below `directory`.
    fn search_by_directory(&self, directory: &Path) -> Result<Vec<PathBuf>, AppError>;
    fn get(&self, path: &Path) -> Result<Option<ImageRecord>, AppError>;
    fn find_by_annotation(&self, word: &str) -> Result<Vec<PathBuf>, AppError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Direct access for settings reads and maintenance.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_paths(paths: Vec<String>) -> Vec<PathBuf> {
    paths.into_iter().map(PathBuf::from).collect()
}

impl AnnotationStore for SqliteStore {
    fn insert(&self, record: &ImageRecord) -> Result<(), AppError> {
        repository::insert_image_record(&self.connection(), record)
    }

    fn remove(&self, path: &Path) -> Result<(), AppError> {
        repository::delete_image_record(&self.connection(), &path.to_string_lossy())?;
        Ok(())
    }

    fn get_last_modified_time(&self, path: &Path) -> Result<Option<DateTime<Utc>>, AppError> {
        repository::get_last_modified(&self.connection(), &path.to_string_lossy())
    }

    fn get_all_files(&self) -> Result<Vec<PathBuf>, AppError> {
        repository::list_indexed_paths(&self.connection()).map(to_paths)
    }

    fn search_by_directory(&self, directory: &Path) -> Result<Vec<PathBuf>, AppError> {
        repository::list_paths_under(&self.connection(), &directory.to_string_lossy())
            .map(to_paths)
    }

    fn get(&self, path: &Path) -> Result<Option<ImageRecord>, AppError> {
        repository::get_image_record(&self.connection(), &path.to_string_lossy())
    }

    fn find_by_annotation(&self, word: &str) -> Result<Vec<PathBuf>, AppError> {
        repository::find_by_annotation(&self.connection(), word).map(to_paths)
    }
}
