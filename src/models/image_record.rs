use std::collections::BTreeSet;
use std::fs::Metadata;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    pub annotations: BTreeSet<String>,
}

impl ImageRecord {
    pub fn new(path: PathBuf, last_modified: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            path,
            last_modified,
            size_bytes,
            annotations: BTreeSet::new(),
        }
    }
}

/// Truncates to microseconds, the precision the store keeps.
pub fn truncate_to_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap_or(at)
}

pub fn modified_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .modified()
        .ok()
        .map(|t| truncate_to_micros(DateTime::<Utc>::from(t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncation_drops_nanoseconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let truncated = truncate_to_micros(at);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(truncate_to_micros(truncated), truncated);
    }

    #[test]
    fn test_modified_at_reads_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();
        let meta = std::fs::metadata(&file).unwrap();
        let at = modified_at(&meta).unwrap();
        assert_eq!(at, truncate_to_micros(at));
    }
}
