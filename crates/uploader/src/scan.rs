//! Watch-folder scanning.

use std::path::{Path, PathBuf};

/// True when `path` has one of the configured video extensions
/// (case-insensitive).
pub fn is_video_file(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Lists candidate video files directly inside `dir`, sorted by name for a
/// predictable upload order.
///
/// Subdirectories (the archive folder included) are not descended into.
pub fn scan_watch_dir(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_video_file(&path, extensions) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
