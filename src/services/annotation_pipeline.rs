use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::IndexerConfig;
use crate::data::store::AnnotationStore;
use crate::error::AppError;
use crate::models::annotation::{ClassifierStatus, ImageType};
use crate::models::image_record::{self, ImageRecord};
use crate::services::backends::AnnotationBackends;
use crate::services::classifier_service::{self, ContentClassifier};
use crate::services::decoder::{Bitmap, ImageDecoder};
use crate::services::ocr_service::{self, OcrBackend};
use crate::services::type_sniffer;
use crate::services::word_filter::WordFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotImage,
    Symlink,
    Unchanged,
    BudgetReached,
    /// A path queued as deleted exists again.
    StillPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Decode,
    Backends,
    NoBackend,
    Store,
}

/// How a work item finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Directory listed; children go back through admission.
    Expanded(Vec<PathBuf>),
    /// A removed directory's previously indexed descendants, to be removed one by one.
    StaleDescendants(Vec<PathBuf>),
    Removed,
    /// No longer a valid indexable image; any stale record was dropped.
    Rejected,
    Skipped(SkipReason),
    Annotated { words: usize },
    Failed(FailureReason),
}

/// Everything the per-image pipeline needs, shared by every work item of a worker.
pub struct PipelineEnv {
    pub store: Arc<dyn AnnotationStore>,
    pub backends: AnnotationBackends,
    pub decoder: Arc<dyn ImageDecoder>,
    pub words: WordFilter,
    pub confidence_threshold: f32,
    pub max_file_size_bytes: u64,
    pub fallback_annotator: bool,
}

impl PipelineEnv {
    pub fn new(
        config: &IndexerConfig,
        store: Arc<dyn AnnotationStore>,
        backends: AnnotationBackends,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            store,
            backends,
            decoder,
            words: WordFilter::new(&config.stop_words),
            confidence_threshold: config.confidence_threshold,
            max_file_size_bytes: config.max_file_size_bytes,
            fallback_annotator: config.fallback_annotator,
        }
    }
}

/// One annotation backend call. Stages run in order and add to a shared word set.
enum Stage {
    Ocr(Arc<dyn OcrBackend>),
    Classifier(Arc<dyn ContentClassifier>),
    FileName,
}

impl Stage {
    /// OCR first, then the classifier; the last enabled stage is terminal.
    fn plan(env: &PipelineEnv) -> Vec<Stage> {
        let mut stages = Vec::new();
        if let Some(ocr) = env.backends.ocr() {
            stages.push(Stage::Ocr(ocr.clone()));
        }
        if let Some(classifier) = env.backends.classifier() {
            stages.push(Stage::Classifier(classifier.clone()));
        }
        if stages.is_empty() && env.fallback_annotator {
            stages.push(Stage::FileName);
        }
        stages
    }

    fn name(&self) -> &'static str {
        match self {
            Stage::Ocr(_) => "ocr",
            Stage::Classifier(_) => "classifier",
            Stage::FileName => "file_name",
        }
    }

    async fn run(
        &self,
        path: &Path,
        bitmap: &Bitmap,
        env: &PipelineEnv,
        words: &mut BTreeSet<String>,
    ) -> Result<(), AppError> {
        match self {
            Stage::Ocr(ocr) => {
                let response = ocr.perform_ocr(bitmap).await?;
                ocr_service::extract_words(&response, &env.words, words);
            }
            Stage::Classifier(classifier) => {
                let response = classifier.annotate_encoded_image(path).await?;
                if response.status != ClassifierStatus::Ok {
                    return Err(AppError::Classifier(format!(
                        "classifier reported {:?}",
                        response.status
                    )));
                }
                classifier_service::extract_words(
                    &response,
                    env.confidence_threshold,
                    &env.words,
                    words,
                );
            }
            Stage::FileName => {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    words.insert(stem.to_lowercase());
                }
            }
        }
        Ok(())
    }
}

async fn sniff(path: &Path) -> ImageType {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || type_sniffer::classify(&owned))
        .await
        .unwrap_or(ImageType::NotImage)
}

fn reject(path: &Path, env: &PipelineEnv, reason: &str) -> ItemOutcome {
    debug!(path = %path.display(), reason, "not an indexable image");
    if let Err(err) = env.store.remove(path) {
        warn!(path = %path.display(), %err, "failed to drop stale record");
    }
    ItemOutcome::Rejected
}

/// Runs one image through validation, dedup, decode, the backend stages and
/// persistence. `on_decoded` fires once the bitmap is available, before any
/// backend is called.
pub async fn annotate<F>(
    path: &Path,
    env: &PipelineEnv,
    budget_exhausted: bool,
    on_decoded: F,
) -> ItemOutcome
where
    F: FnOnce() + Send,
{
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return reject(path, env, "missing"),
    };
    let size_bytes = metadata.len();
    if size_bytes == 0 {
        return reject(path, env, "empty");
    }
    if size_bytes > env.max_file_size_bytes {
        return reject(path, env, "too large");
    }
    if !sniff(path).await.is_indexable() {
        return reject(path, env, "header");
    }
    let Some(last_modified) = image_record::modified_at(&metadata) else {
        return reject(path, env, "no modification time");
    };

    match env.store.get_last_modified_time(path) {
        Ok(Some(recorded)) if recorded == last_modified => {
            debug!(path = %path.display(), "unchanged since last indexed");
            return ItemOutcome::Skipped(SkipReason::Unchanged);
        }
        Ok(_) => {}
        Err(err) => warn!(path = %path.display(), %err, "could not read recorded mtime"),
    }

    if budget_exhausted {
        debug!(path = %path.display(), "indexing limit reached, not annotating");
        return ItemOutcome::Skipped(SkipReason::BudgetReached);
    }

    debug!(path = %path.display(), "decoding");
    let Some(bitmap) = env.decoder.decode_image_file(path).await else {
        warn!(path = %path.display(), "image decode failed");
        return ItemOutcome::Failed(FailureReason::Decode);
    };
    on_decoded();

    let stages = Stage::plan(env);
    if stages.is_empty() {
        warn!(path = %path.display(), "no annotation backend enabled");
        return ItemOutcome::Failed(FailureReason::NoBackend);
    }

    debug!(path = %path.display(), stages = stages.len(), "annotating");
    let mut record = ImageRecord::new(path.to_path_buf(), last_modified, size_bytes);
    let mut succeeded = 0usize;
    for stage in &stages {
        match stage.run(path, &bitmap, env, &mut record.annotations).await {
            Ok(()) => succeeded += 1,
            Err(err) => {
                warn!(path = %path.display(), stage = stage.name(), %err, "annotation stage failed")
            }
        }
    }
    if succeeded == 0 {
        return ItemOutcome::Failed(FailureReason::Backends);
    }

    debug!(path = %path.display(), words = record.annotations.len(), "persisting");
    match env.store.insert(&record) {
        Ok(()) => ItemOutcome::Annotated {
            words: record.annotations.len(),
        },
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to persist annotations");
            ItemOutcome::Failed(FailureReason::Store)
        }
    }
}
