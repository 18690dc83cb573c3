use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::annotation::OcrResponse;
use crate::services::decoder::Bitmap;
use crate::services::word_filter::WordFilter;

/// Text recognition backend. Connections are opened lazily on the first
/// request and dropped by [`OcrBackend::disconnect`] when the queue drains.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn perform_ocr(&self, bitmap: &Bitmap) -> Result<OcrResponse, AppError>;

    fn is_ready(&self) -> bool;

    fn disconnect(&self) {}
}

pub fn extract_words(response: &OcrResponse, filter: &WordFilter, out: &mut BTreeSet<String>) {
    for line in &response.lines {
        filter.extend_from_text(&line.text, out);
    }
}
