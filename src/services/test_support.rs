//! Backend doubles for scheduler and pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::annotation::{
    ClassifierLabel, ClassifierResponse, ClassifierStatus, OcrLine, OcrResponse,
};
use crate::services::classifier_service::ContentClassifier;
use crate::services::decoder::{Bitmap, ImageDecoder};
use crate::services::ocr_service::OcrBackend;

/// Tracks how many backend calls overlap.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct FakeOcr {
    ready: AtomicBool,
    ready_checks: AtomicU32,
    hang: AtomicBool,
    fail: AtomicBool,
    text: Mutex<String>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    disconnects: AtomicUsize,
    gauge: Mutex<Arc<ConcurrencyGauge>>,
}

impl Default for FakeOcr {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
            ready_checks: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            text: Mutex::new(String::new()),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            gauge: Mutex::new(Arc::new(ConcurrencyGauge::default())),
        }
    }
}

impl FakeOcr {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_text(text: &str) -> Arc<Self> {
        let ocr = Self::arc();
        ocr.set_text(text);
        ocr
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_text(&self, text: &str) {
        *lock(&self.text) = text.to_string();
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn share_gauge(&self, gauge: Arc<ConcurrencyGauge>) {
        *lock(&self.gauge) = gauge;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ready_checks(&self) -> u32 {
        self.ready_checks.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for FakeOcr {
    async fn perform_ocr(&self, _bitmap: &Bitmap) -> Result<OcrResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gauge = lock(&self.gauge).clone();
        gauge.enter();
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        gauge.exit();

        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Ocr("fake failure".to_string()));
        }
        let text = lock(&self.text).clone();
        Ok(OcrResponse {
            lines: text
                .lines()
                .map(|line| OcrLine {
                    text: line.to_string(),
                })
                .collect(),
        })
    }

    fn is_ready(&self) -> bool {
        self.ready_checks.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeClassifier {
    ready: AtomicBool,
    ready_checks: AtomicU32,
    fail: AtomicBool,
    status: Mutex<ClassifierStatus>,
    labels: Mutex<Vec<ClassifierLabel>>,
    calls: Mutex<Vec<PathBuf>>,
    retries: Mutex<Vec<u32>>,
    disconnects: AtomicUsize,
    gauge: Mutex<Arc<ConcurrencyGauge>>,
}

impl Default for FakeClassifier {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
            ready_checks: AtomicU32::new(0),
            fail: AtomicBool::new(false),
            status: Mutex::new(ClassifierStatus::Ok),
            labels: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            retries: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            gauge: Mutex::new(Arc::new(ConcurrencyGauge::default())),
        }
    }
}

impl FakeClassifier {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_labels(labels: &[(&str, f32)]) -> Arc<Self> {
        let classifier = Self::arc();
        *lock(&classifier.labels) = labels
            .iter()
            .enumerate()
            .map(|(id, (name, confidence))| ClassifierLabel {
                name: name.to_string(),
                confidence: *confidence,
                id: id as i32,
                mid: format!("/m/{id}"),
            })
            .collect();
        classifier
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: ClassifierStatus) {
        *lock(&self.status) = status;
    }

    pub fn share_gauge(&self, gauge: Arc<ConcurrencyGauge>) {
        *lock(&self.gauge) = gauge;
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        lock(&self.calls).clone()
    }

    pub fn retries(&self) -> Vec<u32> {
        lock(&self.retries).clone()
    }

    pub fn ready_checks(&self) -> u32 {
        self.ready_checks.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentClassifier for FakeClassifier {
    async fn annotate_encoded_image(&self, path: &Path) -> Result<ClassifierResponse, AppError> {
        lock(&self.calls).push(path.to_path_buf());
        let gauge = lock(&self.gauge).clone();
        gauge.enter();
        tokio::task::yield_now().await;
        gauge.exit();

        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Classifier("fake failure".to_string()));
        }
        Ok(ClassifierResponse {
            status: *lock(&self.status),
            annotations: lock(&self.labels).clone(),
        })
    }

    fn is_ready(&self) -> bool {
        self.ready_checks.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }

    fn on_readiness_retry(&self, attempt: u32) {
        lock(&self.retries).push(attempt);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns a 1x1 bitmap for every path, recording decode order.
#[derive(Debug, Default)]
pub struct FakeDecoder {
    decoded: Mutex<Vec<PathBuf>>,
    fail: AtomicBool,
}

impl FakeDecoder {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn decoded(&self) -> Vec<PathBuf> {
        lock(&self.decoded).clone()
    }
}

#[async_trait]
impl ImageDecoder for FakeDecoder {
    async fn decode_image_file(&self, path: &Path) -> Option<Bitmap> {
        lock(&self.decoded).push(path.to_path_buf());
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        Some(Bitmap::new_rgb8(1, 1))
    }
}

pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(2, 2, image::Rgb([200, 100, 50]))
        .save_with_format(&path, image::ImageFormat::Png)
        .unwrap();
    path
}

/// Bumps the file's mtime so the dedup check sees new content.
pub fn touch_later(path: &Path, secs: u64) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    let later = std::time::SystemTime::now() + Duration::from_secs(secs);
    file.set_modified(later).unwrap();
}
