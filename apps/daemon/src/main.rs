//! Clipship daemon entry point.

mod app;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Watches a folder for new video files and uploads each exactly once.
#[derive(Debug, Parser)]
#[command(name = "clipship-daemon", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Watch folder (overrides the configuration file).
    #[arg(long)]
    watch_dir: Option<std::path::PathBuf>,

    /// State directory (overrides the configuration file).
    #[arg(long)]
    state_dir: Option<std::path::PathBuf>,

    /// Run a single check of the watch folder and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting clipship daemon"
    );

    let mut config = config::DaemonConfig::load(cli.config.as_deref())?;
    if let Some(watch_dir) = cli.watch_dir {
        config.watch_dir = watch_dir;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }
    tracing::info!(
        watch_dir = %config.watch_dir.display(),
        state_dir = %config.state_dir.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.once))?;

    tracing::info!("daemon shut down cleanly");
    Ok(())
}
