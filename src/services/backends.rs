use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::IndexerConfig;
use crate::error::AppError;
use crate::services::classifier_service::ContentClassifier;
use crate::services::ocr_service::OcrBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Ocr,
    ContentClassifier,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ocr => write!(f, "ocr"),
            BackendKind::ContentClassifier => write!(f, "content_classifier"),
        }
    }
}

/// The backends enabled by the capability flags, and nothing else.
#[derive(Clone, Default)]
pub struct AnnotationBackends {
    ocr: Option<Arc<dyn OcrBackend>>,
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl AnnotationBackends {
    /// Keeps only the backends the config enables; an enabled backend with no
    /// implementation is a config error.
    pub fn from_config(
        config: &IndexerConfig,
        ocr: Option<Arc<dyn OcrBackend>>,
        classifier: Option<Arc<dyn ContentClassifier>>,
    ) -> Result<Self, AppError> {
        if config.use_ocr && ocr.is_none() {
            return Err(AppError::Config(
                "OCR enabled but no OCR backend provided".to_string(),
            ));
        }
        if config.use_content_classifier && classifier.is_none() {
            return Err(AppError::Config(
                "content classifier enabled but no classifier provided".to_string(),
            ));
        }

        Ok(Self {
            ocr: ocr.filter(|_| config.use_ocr),
            classifier: classifier.filter(|_| config.use_content_classifier),
        })
    }

    pub fn ocr(&self) -> Option<&Arc<dyn OcrBackend>> {
        self.ocr.as_ref()
    }

    pub fn classifier(&self) -> Option<&Arc<dyn ContentClassifier>> {
        self.classifier.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.ocr.is_none() && self.classifier.is_none()
    }

    /// Enabled backends that do not yet report ready.
    pub fn not_ready(&self) -> Vec<BackendKind> {
        let mut missing = Vec::new();
        if self.ocr.as_ref().is_some_and(|ocr| !ocr.is_ready()) {
            missing.push(BackendKind::Ocr);
        }
        if self
            .classifier
            .as_ref()
            .is_some_and(|classifier| !classifier.is_ready())
        {
            missing.push(BackendKind::ContentClassifier);
        }
        missing
    }

    pub fn notify_readiness_retry(&self, attempt: u32) {
        if let Some(classifier) = &self.classifier {
            classifier.on_readiness_retry(attempt);
        }
    }

    pub fn release(&self) {
        debug!("releasing annotation backend connections");
        if let Some(ocr) = &self.ocr {
            ocr.disconnect();
        }
        if let Some(classifier) = &self.classifier {
            classifier.disconnect();
        }
    }
}
