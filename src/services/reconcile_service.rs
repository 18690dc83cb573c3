use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::data::store::AnnotationStore;
use crate::error::AppError;
use crate::services::indexing_service::SchedulerHandle;

/// Indexed paths that no longer exist on disk.
pub fn missing_paths(indexed: Vec<PathBuf>) -> Vec<PathBuf> {
    indexed.into_iter().filter(|path| !path.exists()).collect()
}

/// Queues removal of every indexed path whose file is gone, including paths
/// now under an excluded prefix. Catches deletions that happened while no
/// watcher was running.
pub async fn sweep_deleted_files(
    store: Arc<dyn AnnotationStore>,
    scheduler: &SchedulerHandle,
) -> Result<usize, AppError> {
    let missing = tokio::task::spawn_blocking(move || {
        store.get_all_files().map(missing_paths)
    })
    .await
    .map_err(|e| AppError::General(format!("deleted-files sweep panicked: {e}")))??;

    let count = missing.len();
    for path in missing {
        if !scheduler.remove_stale(path) {
            break;
        }
    }
    info!(missing = count, "deleted-files sweep finished");
    Ok(count)
}
