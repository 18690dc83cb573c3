//! Background indexer that annotates images under a directory tree with
//! searchable words from OCR and an on-device content classifier.

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub(crate) mod scope_path;
pub mod services;
pub mod state;

pub use config::IndexerConfig;
pub use data::store::{AnnotationStore, SqliteStore};
pub use error::AppError;
pub use logging::init_tracing;
pub use models::image_record::ImageRecord;
pub use services::classifier_service::ContentClassifier;
pub use services::decoder::{Bitmap, ImageDecoder};
pub use services::indexing_service::{IndexingHandle, IndexingWorker};
pub use services::ocr_service::OcrBackend;
pub use state::{GateState, IndexerStatus};
