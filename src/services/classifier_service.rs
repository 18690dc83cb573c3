use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::annotation::{ClassifierResponse, ClassifierStatus};
use crate::services::word_filter::WordFilter;

/// Image content classifier. Readiness means its model component finished
/// installing.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn annotate_encoded_image(&self, path: &Path) -> Result<ClassifierResponse, AppError>;

    fn is_ready(&self) -> bool;

    /// Called each time the readiness gate schedules another poll.
    fn on_readiness_retry(&self, _attempt: u32) {}

    fn disconnect(&self) {}
}

/// Adds accepted words from labels at or above `threshold`. A response with a
/// non-OK status contributes nothing.
pub fn extract_words(
    response: &ClassifierResponse,
    threshold: f32,
    filter: &WordFilter,
    out: &mut BTreeSet<String>,
) {
    if response.status != ClassifierStatus::Ok {
        return;
    }
    for label in &response.annotations {
        if label.name.is_empty() || label.confidence < threshold {
            continue;
        }
        filter.extend_from_text(&label.name, out);
    }
}
