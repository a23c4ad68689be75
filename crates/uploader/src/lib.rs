//! Upload orchestration for the clipship pipeline.
//!
//! A single worker drives candidate video files through a persistent state
//! machine: dedupe by content hash, quota-cooldown gating, chunked resumable
//! transfer, retry with exponential backoff, and the safe move into the
//! archive folder. Every externally visible transition is checkpointed to
//! disk before and after the call it brackets, so a crash at any point
//! resumes instead of restarting or duplicating work.

mod chunk;
mod config;
mod error;
mod governor;
mod orchestrator;
mod scan;
mod watch;
mod worker;

pub use chunk::ChunkReader;
pub use config::{UploaderConfig, retry_backoff};
pub use error::UploadError;
pub use governor::QuotaGovernor;
pub use orchestrator::{FileOutcome, Orchestrator, PassSummary};
pub use scan::{is_video_file, scan_watch_dir};
pub use watch::spawn_watcher;
pub use worker::{WorkSignal, run_worker};
