pub mod annotation_pipeline;
pub mod backends;
pub mod classifier_service;
pub mod decoder;
pub mod indexing_service;
pub mod ocr_service;
pub mod readiness_gate;
pub mod reconcile_service;
pub mod type_sniffer;
pub mod watch_service;
pub mod word_filter;

#[cfg(test)]
pub(crate) mod test_support;
