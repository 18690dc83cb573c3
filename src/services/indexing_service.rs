use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IndexerConfig;
use crate::data::store::AnnotationStore;
use crate::error::AppError;
use crate::models::annotation::ImageType;
use crate::scope_path;
use crate::services::annotation_pipeline::{self, ItemOutcome, PipelineEnv, SkipReason};
use crate::services::backends::AnnotationBackends;
use crate::services::classifier_service::ContentClassifier;
use crate::services::decoder::{ImageCrateDecoder, ImageDecoder};
use crate::services::ocr_service::OcrBackend;
use crate::services::readiness_gate::ReadinessGate;
use crate::services::reconcile_service;
use crate::services::type_sniffer;
use crate::services::watch_service::{self, WatchHandle};
use crate::state::{GateState, IndexerStatus, IndexingBudget};

#[derive(Debug)]
pub(crate) enum SchedulerMessage {
    Admit(PathBuf),
    RemoveStale(PathBuf),
    Gate(GateState),
    ArmTimeout { path: PathBuf, generation: u64 },
    Completed {
        path: PathBuf,
        generation: u64,
        outcome: ItemOutcome,
    },
    TimedOut { path: PathBuf, generation: u64 },
    Shutdown,
}

/// Cheap, cloneable mailbox for the scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerMessage>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SchedulerMessage>) -> Self {
        Self { tx }
    }

    /// Hands `path` to the scheduler's admission logic. Returns `false` once the
    /// scheduler has stopped.
    pub fn admit(&self, path: PathBuf) -> bool {
        self.tx.send(SchedulerMessage::Admit(path)).is_ok()
    }

    /// Queues removal of an indexed path known to be gone. Skips the exclusion
    /// filter: a record is dropped even if its path has since been excluded.
    pub fn remove_stale(&self, path: PathBuf) -> bool {
        self.tx.send(SchedulerMessage::RemoveStale(path)).is_ok()
    }

    fn send(&self, message: SchedulerMessage) {
        let _ = self.tx.send(message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkKind {
    Classify,
    RemoveStale,
}

#[derive(Debug, Clone)]
struct WorkItem {
    path: PathBuf,
    kind: WorkKind,
}

struct InFlight {
    path: PathBuf,
    generation: u64,
    task: AbortHandle,
    timer: Option<AbortHandle>,
}

/// Single-flight FIFO scheduler. The front of `queue` is the item in flight;
/// nothing else is processed until it completes or times out.
pub(crate) struct Scheduler {
    queue: VecDeque<WorkItem>,
    in_flight: Option<InFlight>,
    next_generation: u64,
    env: Arc<PipelineEnv>,
    excluded_prefixes: Vec<String>,
    annotation_timeout: Duration,
    budget: IndexingBudget,
    tx: mpsc::UnboundedSender<SchedulerMessage>,
    stats: IndexerStatus,
    status: watch::Sender<IndexerStatus>,
    drain_started: Option<Instant>,
}

impl Scheduler {
    pub(crate) fn new(
        config: &IndexerConfig,
        env: Arc<PipelineEnv>,
        tx: mpsc::UnboundedSender<SchedulerMessage>,
        status: watch::Sender<IndexerStatus>,
    ) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            next_generation: 0,
            env,
            excluded_prefixes: config.excluded_prefixes.clone(),
            annotation_timeout: config.annotation_timeout(),
            budget: IndexingBudget::new(config.indexing_limit),
            tx,
            stats: IndexerStatus::default(),
            status,
            drain_started: None,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SchedulerMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                SchedulerMessage::Admit(path) => self.admit(path),
                SchedulerMessage::RemoveStale(path) => self.push(WorkItem {
                    path,
                    kind: WorkKind::RemoveStale,
                }),
                SchedulerMessage::Gate(state) => {
                    self.stats.gate = state;
                    self.publish();
                }
                SchedulerMessage::ArmTimeout { path, generation } => {
                    self.arm_timeout(&path, generation)
                }
                SchedulerMessage::Completed {
                    path,
                    generation,
                    outcome,
                } => self.complete(&path, generation, outcome),
                SchedulerMessage::TimedOut { path, generation } => {
                    self.time_out(&path, generation)
                }
                SchedulerMessage::Shutdown => break,
            }
        }
        self.stop();
    }

    /// Exclusion filter, then append. Only an empty queue needs a kick; a
    /// non-empty one is already being drained.
    pub(crate) fn admit(&mut self, path: PathBuf) {
        if scope_path::is_excluded(&path, &self.excluded_prefixes) {
            debug!(path = %path.display(), "excluded path dropped");
            return;
        }
        self.push(WorkItem {
            path,
            kind: WorkKind::Classify,
        });
    }

    fn push(&mut self, item: WorkItem) {
        let was_empty = self.queue.is_empty();
        self.queue.push_back(item);
        if was_empty {
            self.pump();
        }
        self.publish();
    }

    fn is_current(&self, path: &Path, generation: u64) -> bool {
        self.queue.front().map(|item| item.path.as_path()) == Some(path)
            && self
                .in_flight
                .as_ref()
                .is_some_and(|current| current.generation == generation)
    }

    fn pump(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(WorkItem { path, kind }) = self.queue.front().cloned() else {
            self.on_drained();
            return;
        };
        if self.drain_started.is_none() {
            self.drain_started = Some(Instant::now());
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let budget_exhausted = self.budget.is_exhausted();
        let env = self.env.clone();
        let handle = SchedulerHandle::new(self.tx.clone());
        let item_path = path.clone();

        debug!(path = %path.display(), generation, ?kind, "processing");
        let task = tokio::spawn(async move {
            let outcome = match kind {
                WorkKind::Classify => {
                    process_item(&item_path, &env, budget_exhausted, &handle, generation).await
                }
                WorkKind::RemoveStale => remove_stale_record(&item_path, &env).await,
            };
            handle.send(SchedulerMessage::Completed {
                path: item_path,
                generation,
                outcome,
            });
        });

        self.in_flight = Some(InFlight {
            path,
            generation,
            task: task.abort_handle(),
            timer: None,
        });
    }

    fn arm_timeout(&mut self, path: &Path, generation: u64) {
        if !self.is_current(path, generation) {
            return;
        }
        let timeout = self.annotation_timeout;
        let handle = SchedulerHandle::new(self.tx.clone());
        let timed_path = path.to_path_buf();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            handle.send(SchedulerMessage::TimedOut {
                path: timed_path,
                generation,
            });
        });

        if let Some(current) = self.in_flight.as_mut() {
            if let Some(previous) = current.timer.replace(timer.abort_handle()) {
                previous.abort();
            }
        }
    }

    fn complete(&mut self, path: &Path, generation: u64, outcome: ItemOutcome) {
        if !self.is_current(path, generation) {
            debug!(path = %path.display(), generation, "stale completion ignored");
            return;
        }
        self.apply_outcome(path, outcome);
        self.advance(path, generation, false);
    }

    fn time_out(&mut self, path: &Path, generation: u64) {
        if !self.is_current(path, generation) {
            return;
        }
        warn!(
            path = %path.display(),
            timeout_secs = self.annotation_timeout.as_secs(),
            "annotation timed out"
        );
        self.stats.timed_out += 1;
        self.advance(path, generation, true);
    }

    /// Pops the front item if it is still `path`; the loser of a
    /// completion/timeout race is a no-op.
    pub(crate) fn advance(&mut self, path: &Path, generation: u64, from_timeout: bool) -> bool {
        if !self.is_current(path, generation) {
            return false;
        }
        let Some(current) = self.in_flight.take() else {
            return false;
        };
        if let Some(timer) = current.timer {
            timer.abort();
        }
        if from_timeout {
            current.task.abort();
        }
        debug!(path = %current.path.display(), generation, "done");

        self.queue.pop_front();
        self.stats.processed += 1;
        self.pump();
        self.publish();
        true
    }

    fn apply_outcome(&mut self, path: &Path, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Expanded(children) => {
                debug!(path = %path.display(), children = children.len(), "expanded directory");
                for child in children {
                    self.admit(child);
                }
            }
            ItemOutcome::StaleDescendants(paths) => {
                debug!(path = %path.display(), stale = paths.len(), "directory removed");
                for stale in paths {
                    self.admit(stale);
                }
            }
            ItemOutcome::Removed => self.stats.removed += 1,
            ItemOutcome::Rejected | ItemOutcome::Skipped(_) => self.stats.skipped += 1,
            ItemOutcome::Annotated { .. } => {
                self.stats.annotated += 1;
                self.budget.record_annotation();
            }
            ItemOutcome::Failed(reason) => {
                debug!(path = %path.display(), ?reason, "item failed");
                self.stats.failed += 1;
            }
        }
    }

    fn on_drained(&mut self) {
        let Some(started) = self.drain_started.take() else {
            return;
        };
        self.env.backends.release();
        let elapsed = started.elapsed();
        self.stats.drains += 1;
        self.stats.last_drain = Some(elapsed);
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            processed = self.stats.processed,
            annotated = self.stats.annotated,
            "indexing queue drained"
        );
    }

    fn publish(&mut self) {
        self.stats.queued = self.queue.len();
        self.stats.in_flight = self.in_flight.is_some();
        self.stats.budget_used = self.budget.count_this_session;
        self.status.send_replace(self.stats.clone());
    }

    fn stop(&mut self) {
        if let Some(current) = self.in_flight.take() {
            current.task.abort();
            if let Some(timer) = current.timer {
                timer.abort();
            }
        }
        self.queue.clear();
        self.env.backends.release();
        self.publish();
        info!("indexing scheduler stopped");
    }
}

async fn process_item(
    path: &Path,
    env: &PipelineEnv,
    budget_exhausted: bool,
    scheduler: &SchedulerHandle,
    generation: u64,
) -> ItemOutcome {
    // Links are never followed; a link back to an ancestor would expand forever.
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            debug!(path = %path.display(), "symlink not followed");
            ItemOutcome::Skipped(SkipReason::Symlink)
        }
        Ok(metadata) if metadata.is_dir() => expand_directory(path).await,
        Ok(metadata) if metadata.is_file() => {
            let owned = path.to_path_buf();
            let image_type = tokio::task::spawn_blocking(move || type_sniffer::classify(&owned))
                .await
                .unwrap_or(ImageType::NotImage);
            if image_type == ImageType::NotImage {
                return ItemOutcome::Skipped(SkipReason::NotImage);
            }
            annotation_pipeline::annotate(path, env, budget_exhausted, || {
                scheduler.send(SchedulerMessage::ArmTimeout {
                    path: path.to_path_buf(),
                    generation,
                })
            })
            .await
        }
        Ok(_) => ItemOutcome::Skipped(SkipReason::NotImage),
        Err(_) => remove_missing(path, env),
    }
}

async fn expand_directory(path: &Path) -> ItemOutcome {
    let mut children = Vec::new();
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %path.display(), %err, "could not list directory");
            return ItemOutcome::Expanded(children);
        }
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => children.push(entry.path()),
            Ok(None) => break,
            Err(err) => {
                warn!(path = %path.display(), %err, "directory listing interrupted");
                break;
            }
        }
    }
    ItemOutcome::Expanded(children)
}

async fn remove_stale_record(path: &Path, env: &PipelineEnv) -> ItemOutcome {
    if tokio::fs::symlink_metadata(path).await.is_ok() {
        debug!(path = %path.display(), "stale path reappeared, record kept");
        return ItemOutcome::Skipped(SkipReason::StillPresent);
    }
    remove_record(path, env)
}

fn remove_missing(path: &Path, env: &PipelineEnv) -> ItemOutcome {
    if !scope_path::has_final_extension(path) {
        return match env.store.search_by_directory(path) {
            Ok(paths) => ItemOutcome::StaleDescendants(paths),
            Err(err) => {
                warn!(path = %path.display(), %err, "could not look up removed directory");
                ItemOutcome::StaleDescendants(Vec::new())
            }
        };
    }
    remove_record(path, env)
}

fn remove_record(path: &Path, env: &PipelineEnv) -> ItemOutcome {
    match env.store.remove(path) {
        Ok(()) => ItemOutcome::Removed,
        Err(err) => {
            warn!(path = %path.display(), %err, "could not remove record");
            ItemOutcome::Failed(annotation_pipeline::FailureReason::Store)
        }
    }
}

/// Builds and starts a background indexing worker.
///
/// ```ignore
/// let handle = IndexingWorker::new(config, store)
///     .with_ocr(ocr)
///     .with_classifier(classifier)
///     .start()?;
/// ```
pub struct IndexingWorker {
    config: IndexerConfig,
    store: Arc<dyn AnnotationStore>,
    ocr: Option<Arc<dyn OcrBackend>>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    decoder: Arc<dyn ImageDecoder>,
}

impl IndexingWorker {
    pub fn new(config: IndexerConfig, store: Arc<dyn AnnotationStore>) -> Self {
        Self {
            config,
            store,
            ocr: None,
            classifier: None,
            decoder: Arc::new(ImageCrateDecoder),
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Spawns the scheduler and the readiness gate on the current tokio
    /// runtime. Once the gate arms, the watcher starts, the deleted-files
    /// sweep runs and the root is queued.
    pub fn start(self) -> Result<IndexingHandle, AppError> {
        let mut config = self.config;
        config.validate()?;
        if !config.root.is_dir() {
            return Err(AppError::Watcher(format!(
                "not a directory: {}",
                config.root.display()
            )));
        }
        // The scheduler does not follow links, so a linked root is resolved once here.
        if std::fs::symlink_metadata(&config.root)?.file_type().is_symlink() {
            config.root = std::fs::canonicalize(&config.root)?;
        }

        let backends = AnnotationBackends::from_config(&config, self.ocr, self.classifier)?;
        let env = Arc::new(PipelineEnv::new(
            &config,
            self.store.clone(),
            backends.clone(),
            self.decoder,
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(IndexerStatus::default());
        let scheduler = Scheduler::new(&config, env, tx.clone(), status_tx);
        let scheduler_task = tokio::spawn(scheduler.run(rx));
        let handle = SchedulerHandle::new(tx);

        let watcher_slot: Arc<Mutex<Option<WatchHandle>>> = Arc::new(Mutex::new(None));
        let gate_task = tokio::spawn(arm_when_ready(
            config,
            backends,
            self.store,
            handle.clone(),
            watcher_slot.clone(),
        ));

        Ok(IndexingHandle {
            scheduler: handle,
            status: status_rx,
            scheduler_task,
            gate_task,
            watcher: watcher_slot,
        })
    }
}

async fn arm_when_ready(
    config: IndexerConfig,
    backends: AnnotationBackends,
    store: Arc<dyn AnnotationStore>,
    scheduler: SchedulerHandle,
    watcher_slot: Arc<Mutex<Option<WatchHandle>>>,
) {
    let gate = ReadinessGate::new(backends, config.readiness_retry_ceiling);
    let state = gate.wait_until_ready().await;
    scheduler.send(SchedulerMessage::Gate(state));
    if state != GateState::Armed {
        return;
    }

    if config.enable_watchers {
        match watch_service::start_watching(&config.root, scheduler.clone()) {
            Ok(watcher) => {
                *watcher_slot
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(watcher);
            }
            Err(err) => warn!(root = %config.root.display(), %err, "watcher not started"),
        }
    }

    let sweep_scheduler = scheduler.clone();
    tokio::spawn(async move {
        if let Err(err) = reconcile_service::sweep_deleted_files(store, &sweep_scheduler).await {
            warn!(%err, "deleted-files sweep failed");
        }
    });

    info!(root = %config.root.display(), "indexing armed");
    scheduler.admit(config.root);
}

/// Keeps a worker alive. Dropping it shuts the worker down.
pub struct IndexingHandle {
    scheduler: SchedulerHandle,
    status: watch::Receiver<IndexerStatus>,
    scheduler_task: JoinHandle<()>,
    gate_task: JoinHandle<()>,
    watcher: Arc<Mutex<Option<WatchHandle>>>,
}

impl IndexingHandle {
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> bool {
        self.scheduler.admit(path.into())
    }

    pub fn status(&self) -> IndexerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IndexerStatus> {
        self.status.clone()
    }

    /// Resolves with the first status matching `predicate`, or `None` if the
    /// worker stopped first.
    pub async fn wait_until<F>(&self, predicate: F) -> Option<IndexerStatus>
    where
        F: FnMut(&IndexerStatus) -> bool,
    {
        let mut rx = self.status.clone();
        let status = rx.wait_for(predicate).await.ok()?.clone();
        Some(status)
    }

    pub fn shutdown(&self) {
        self.gate_task.abort();
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.scheduler.send(SchedulerMessage::Shutdown);
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler_task.is_finished()
    }
}

impl Drop for IndexingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
