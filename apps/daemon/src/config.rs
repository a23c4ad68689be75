//! Daemon configuration.
//!
//! Reads TOML at `~/.config/clipship/config.toml`. Every key is optional;
//! missing keys fall back to the pipeline defaults. State documents live
//! under `~/.local/share/clipship` unless overridden.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clipship_remote::Privacy;
use clipship_uploader::UploaderConfig;
use serde::Deserialize;

/// On-disk TOML shape.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    watch_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    archive_dir_name: Option<String>,
    video_extensions: Option<Vec<String>>,
    collection: Option<String>,
    privacy: Option<Privacy>,
    category: Option<String>,
    archive_duplicates: Option<bool>,
    add_duplicates_to_collection: Option<bool>,
    poll_interval_secs: Option<u64>,
}

/// Resolved daemon settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub watch_dir: PathBuf,
    pub state_dir: PathBuf,
    pub archive_dir_name: Option<String>,
    pub video_extensions: Option<Vec<String>>,
    pub collection: Option<String>,
    pub privacy: Privacy,
    pub category: String,
    pub archive_duplicates: Option<bool>,
    pub add_duplicates_to_collection: Option<bool>,
    pub poll_interval: Option<Duration>,
}

impl DaemonConfig {
    /// Loads configuration, tolerating a missing file (defaults apply).
    /// A malformed file is an error: silently ignoring a typo'd config
    /// would upload to the wrong place.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let file: ConfigFile = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            ConfigFile::default()
        };

        Ok(Self {
            watch_dir: file.watch_dir.unwrap_or_else(default_watch_dir),
            state_dir: file.state_dir.unwrap_or_else(default_state_dir),
            archive_dir_name: file.archive_dir_name,
            video_extensions: file.video_extensions,
            collection: file.collection,
            privacy: file.privacy.unwrap_or_default(),
            category: file.category.unwrap_or_default(),
            archive_duplicates: file.archive_duplicates,
            add_duplicates_to_collection: file.add_duplicates_to_collection,
            poll_interval: file.poll_interval_secs.map(Duration::from_secs),
        })
    }

    /// Translates daemon settings into the pipeline configuration.
    pub fn uploader_config(&self) -> UploaderConfig {
        let mut config = UploaderConfig::new(&self.watch_dir);
        if let Some(name) = &self.archive_dir_name {
            config.archive_dir_name = name.clone();
        }
        if let Some(extensions) = &self.video_extensions {
            config.video_extensions = extensions.clone();
        }
        config.collection_id = self.collection.clone();
        config.privacy = self.privacy;
        config.category = self.category.clone();
        if let Some(v) = self.archive_duplicates {
            config.archive_duplicates = v;
        }
        if let Some(v) = self.add_duplicates_to_collection {
            config.add_duplicates_to_collection = v;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        config
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn default_config_path() -> PathBuf {
    home_dir().join(".config").join("clipship").join("config.toml")
}

fn default_state_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("clipship")
}

fn default_watch_dir() -> PathBuf {
    home_dir().join("Videos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DaemonConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.privacy, Privacy::Private);
        assert!(config.collection.is_none());

        let uploader = config.uploader_config();
        assert_eq!(uploader.archive_dir_name, "Uploaded");
        assert_eq!(uploader.max_retries, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
watch_dir = "/videos/incoming"
collection = "pl-main"
privacy = "unlisted"
archive_duplicates = false
poll_interval_secs = 10
video_extensions = ["mp4", "mkv"]
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        let uploader = config.uploader_config();

        assert_eq!(uploader.watch_dir, PathBuf::from("/videos/incoming"));
        assert_eq!(uploader.collection_id.as_deref(), Some("pl-main"));
        assert_eq!(uploader.privacy, Privacy::Unlisted);
        assert!(!uploader.archive_duplicates);
        assert_eq!(uploader.poll_interval, Duration::from_secs(10));
        assert_eq!(uploader.video_extensions, vec!["mp4", "mkv"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "wacth_dir = 3").unwrap();
        assert!(DaemonConfig::load(Some(&path)).is_err());
    }
}
