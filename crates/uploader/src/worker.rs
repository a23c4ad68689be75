//! The single upload worker loop.
//!
//! Consumes candidate signals from the watcher and force-check triggers,
//! rescans the watch folder on a periodic tick, and drives the orchestrator
//! one pass at a time. Retry-due and cooldown-expiry timers are evaluated
//! lazily inside each pass; no dedicated callbacks are scheduled.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::scan::scan_watch_dir;

/// Work fed to the upload worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSignal {
    /// A candidate file reported by the folder watcher.
    Candidate(PathBuf),
    /// Manual "check now" trigger.
    ForceCheck,
}

/// Runs passes until cancelled or the signal channel closes.
///
/// Cancellation takes effect between files (the orchestrator checks the
/// token before each candidate), never mid-chunk.
pub async fn run_worker(
    orchestrator: &mut Orchestrator,
    mut signals: mpsc::Receiver<WorkSignal>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(orchestrator.config().poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let mut queued: Vec<PathBuf> = Vec::new();

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
            signal = signals.recv() => match signal {
                Some(WorkSignal::Candidate(path)) => queued.push(path),
                Some(WorkSignal::ForceCheck) => debug!("force check requested"),
                None => break,
            }
        }

        // Fold in whatever else already arrived.
        while let Ok(signal) = signals.try_recv() {
            if let WorkSignal::Candidate(path) = signal {
                queued.push(path);
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        let config = orchestrator.config();
        let mut candidates =
            match scan_watch_dir(&config.watch_dir, &config.video_extensions) {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        dir = %config.watch_dir.display(),
                        error = %e,
                        "watch folder scan failed"
                    );
                    Vec::new()
                }
            };
        for path in queued {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
        if candidates.is_empty() {
            continue;
        }

        let summary = orchestrator.run_pass(&candidates, &cancel).await;
        if !summary.is_quiet() {
            info!(
                uploaded = summary.uploaded,
                duplicates = summary.duplicates,
                failed = summary.failed,
                quota_blocked = summary.quota_blocked,
                "pass finished"
            );
        }
        if summary.quota_blocked
            && let Some(remaining) = orchestrator.governor().remaining_cooldown(chrono::Utc::now())
        {
            info!(
                remaining_minutes = remaining.num_minutes(),
                "uploads suspended by quota cooldown"
            );
        }
    }

    info!(
        session_uploads = orchestrator.session_uploads(),
        total_uploads = orchestrator.total_uploads(),
        "upload worker stopped"
    );
}
