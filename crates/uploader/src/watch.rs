//! Folder watcher: pushes new video files into the worker's channel.
//!
//! Thin producer over `notify`; the worker and orchestrator never depend on
//! the watch mechanism. Missed events are harmless because the worker also
//! rescans the folder on every tick.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::scan::is_video_file;
use crate::worker::WorkSignal;

/// Starts watching `watch_dir` (non-recursively) and forwards created or
/// modified video files as [`WorkSignal::Candidate`]s until `cancel` fires.
pub fn spawn_watcher(
    watch_dir: &Path,
    extensions: Vec<String>,
    tx: mpsc::Sender<WorkSignal>,
    cancel: CancellationToken,
) -> notify::Result<()> {
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    if is_video_file(&path, &extensions) && path.is_file() {
                        debug!(file = %path.display(), "watcher: new candidate");
                        // The callback runs on notify's own thread, so a
                        // blocking send into the async channel is fine.
                        if tx.blocking_send(WorkSignal::Candidate(path)).is_err() {
                            return; // worker gone
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    debug!(dir = %watch_dir.display(), "folder watcher started");

    // Keep the watcher alive until cancellation.
    tokio::spawn(async move {
        cancel.cancelled().await;
        drop(watcher);
        debug!("folder watcher stopped");
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn watcher_reports_new_video_file() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        spawn_watcher(
            dir.path(),
            vec!["mp4".into()],
            tx,
            cancel.clone(),
        )
        .unwrap();

        // Give the backend a moment to arm before writing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"footage").unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher did not report the new file")
            .expect("channel closed");
        assert_eq!(signal, WorkSignal::Candidate(path));

        cancel.cancel();
    }
}
