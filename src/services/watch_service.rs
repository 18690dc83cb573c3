use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::services::indexing_service::SchedulerHandle;

/// Stops watching when dropped.
pub struct WatchHandle {
    _watcher: notify::RecommendedWatcher,
}

/// Paths an event should hand to the scheduler. Access events are dropped;
/// sniffing a file header would otherwise feed itself.
pub fn paths_to_admit(event: Event) -> Vec<PathBuf> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }
    event.paths
}

/// Recursively watches `root`, sending every create, modify and remove to the
/// scheduler. Directory events are expanded or swept by the scheduler itself.
pub fn start_watching(root: &Path, scheduler: SchedulerHandle) -> Result<WatchHandle, AppError> {
    if !root.is_dir() {
        return Err(AppError::Watcher(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                for path in paths_to_admit(event) {
                    debug!(path = %path.display(), "watch event");
                    scheduler.admit(path);
                }
            }
            Err(err) => warn!(%err, "watcher error"),
        }
    })
    .map_err(|e| AppError::Watcher(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| AppError::Watcher(e.to_string()))?;

    Ok(WatchHandle { _watcher: watcher })
}
