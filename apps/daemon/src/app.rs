//! Wires the upload pipeline together and runs it until shutdown.
//!
//! The daemon drives the pipeline against the in-memory loopback host; the
//! authenticated provider client lives in the application embedding
//! `clipship-uploader` and is injected there in place of the loopback.

use std::sync::Arc;

use clipship_remote::MemoryHost;
use clipship_store::StateDir;
use clipship_uploader::{Orchestrator, run_worker, scan_watch_dir, spawn_watcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DaemonConfig;

/// Runs the pipeline until ctrl-c (or, with `once`, for a single pass).
pub async fn run(config: DaemonConfig, once: bool) -> anyhow::Result<()> {
    let store = StateDir::open(&config.state_dir)?;
    let uploader_config = config.uploader_config();
    std::fs::create_dir_all(&uploader_config.watch_dir)?;

    let host = Arc::new(MemoryHost::new());
    let mut orchestrator = Orchestrator::new(host, uploader_config.clone(), store);
    let cancel = CancellationToken::new();

    if once {
        let candidates =
            scan_watch_dir(&uploader_config.watch_dir, &uploader_config.video_extensions)?;
        info!(candidates = candidates.len(), "single check requested");
        let summary = orchestrator.run_pass(&candidates, &cancel).await;
        info!(
            uploaded = summary.uploaded,
            duplicates = summary.duplicates,
            failed = summary.failed,
            quota_blocked = summary.quota_blocked,
            "check finished"
        );
        for error in &summary.collection_errors {
            warn!(error = %error, "collection needs attention");
        }
        return Ok(());
    }

    let (signals_tx, signals_rx) = tokio::sync::mpsc::channel(256);
    spawn_watcher(
        &uploader_config.watch_dir,
        uploader_config.video_extensions.clone(),
        signals_tx,
        cancel.clone(),
    )?;

    // Ctrl-c stops the worker between files; an in-flight chunk either
    // completes and checkpoints or stays resumable on disk.
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            stop.cancel();
        }
    });

    info!(watch_dir = %uploader_config.watch_dir.display(), "watching for new videos");
    run_worker(&mut orchestrator, signals_rx, cancel).await;

    info!(
        session_uploads = orchestrator.session_uploads(),
        total_uploads = orchestrator.total_uploads(),
        "upload statistics at shutdown"
    );
    Ok(())
}
