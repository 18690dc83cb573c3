use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::repository;
use crate::error::AppError;

pub const DEFAULT_INDEXING_LIMIT: u32 = 500;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 79.0 / 255.0;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_ANNOTATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_READINESS_RETRY_CEILING: u32 = 12;

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "her",
    "his", "how", "into", "its", "just", "more", "not", "now", "of", "on", "one", "only", "or",
    "our", "out", "she", "should", "some", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "was", "were", "what", "when", "which", "who", "will",
    "with", "would", "you", "your",
];

const SETTING_INDEXING_LIMIT: &str = "indexing_limit";
const SETTING_EXCLUDED_PREFIXES: &str = "excluded_prefixes";
const SETTING_CONFIDENCE_THRESHOLD: &str = "confidence_threshold";
const SETTING_USE_OCR: &str = "use_ocr";
const SETTING_USE_CONTENT_CLASSIFIER: &str = "use_content_classifier";
const SETTING_ENABLE_WATCHERS: &str = "enable_watchers";

/// Worker configuration, fixed for the lifetime of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Directory tree to watch and index.
    pub root: PathBuf,
    pub excluded_prefixes: Vec<String>,
    /// Images annotated per worker lifetime; `None` disables the cap.
    pub indexing_limit: Option<u32>,
    /// Minimum classifier confidence, as a fraction of the backend's scale.
    pub confidence_threshold: f32,
    pub use_ocr: bool,
    pub use_content_classifier: bool,
    pub enable_watchers: bool,
    /// Derive a token from the file name when no backend is enabled. Test setups only.
    pub fallback_annotator: bool,
    pub stop_words: Vec<String>,
    pub max_file_size_bytes: u64,
    pub annotation_timeout_secs: u64,
    pub readiness_retry_ceiling: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            excluded_prefixes: Vec::new(),
            indexing_limit: Some(DEFAULT_INDEXING_LIMIT),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            use_ocr: true,
            use_content_classifier: true,
            enable_watchers: true,
            fallback_annotator: false,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            annotation_timeout_secs: DEFAULT_ANNOTATION_TIMEOUT_SECS,
            readiness_retry_ceiling: DEFAULT_READINESS_RETRY_CEILING,
        }
    }
}

impl IndexerConfig {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn annotation_timeout(&self) -> Duration {
        Duration::from_secs(self.annotation_timeout_secs)
    }

    pub fn has_backend(&self) -> bool {
        self.use_ocr || self.use_content_classifier
    }

    /// Overrides fields from the store's `settings` table. Unparseable values are skipped.
    pub fn apply_settings(&mut self, conn: &Connection) -> Result<(), AppError> {
        if let Some(raw) = repository::get_setting(conn, SETTING_INDEXING_LIMIT)? {
            match raw.trim() {
                "" | "off" | "none" => self.indexing_limit = None,
                value => match value.parse::<u32>() {
                    Ok(limit) => self.indexing_limit = Some(limit),
                    Err(err) => warn!(key = SETTING_INDEXING_LIMIT, %raw, %err, "ignoring setting"),
                },
            }
        }

        if let Some(raw) = repository::get_setting(conn, SETTING_EXCLUDED_PREFIXES)? {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(prefixes) => self.excluded_prefixes = prefixes,
                Err(err) => warn!(key = SETTING_EXCLUDED_PREFIXES, %raw, %err, "ignoring setting"),
            }
        }

        if let Some(raw) = repository::get_setting(conn, SETTING_CONFIDENCE_THRESHOLD)? {
            match raw.trim().parse::<f32>() {
                Ok(threshold) => self.confidence_threshold = threshold,
                Err(err) => {
                    warn!(key = SETTING_CONFIDENCE_THRESHOLD, %raw, %err, "ignoring setting")
                }
            }
        }

        apply_bool_setting(conn, SETTING_USE_OCR, &mut self.use_ocr)?;
        apply_bool_setting(
            conn,
            SETTING_USE_CONTENT_CLASSIFIER,
            &mut self.use_content_classifier,
        )?;
        apply_bool_setting(conn, SETTING_ENABLE_WATCHERS, &mut self.enable_watchers)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.has_backend() && !self.fallback_annotator {
            return Err(AppError::Config(
                "no annotation backend enabled".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AppError::Config(format!(
                "confidence threshold {} outside 0..=1",
                self.confidence_threshold
            )));
        }
        if self.root.as_os_str().is_empty() {
            return Err(AppError::Config("no root directory configured".to_string()));
        }
        Ok(())
    }
}

fn apply_bool_setting(conn: &Connection, key: &str, target: &mut bool) -> Result<(), AppError> {
    let Some(raw) = repository::get_setting(conn, key)? else {
        return Ok(());
    };
    match raw.trim() {
        "1" | "true" | "on" => *target = true,
        "0" | "false" | "off" => *target = false,
        _ => warn!(key, %raw, "ignoring setting"),
    }
    Ok(())
}
