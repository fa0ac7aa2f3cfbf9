//! Finds the `.txt` files to convert.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use speechify_core::output_path;

/// Lists `.txt` files (extension matched case-insensitively) under `root`,
/// sorted by path. Subdirectories are only visited when `recursive`; entries
/// that cannot be read below the root are logged and skipped.
pub fn discover_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    info!(root = %root.display(), recursive, "Scanning for .txt files");
    let mut files = Vec::new();

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read scan directory {}", root.display()))?;
    collect(entries, recursive, &mut files);

    files.sort();
    info!(count = files.len(), "Scan complete");
    Ok(files)
}

fn collect(entries: std::fs::ReadDir, recursive: bool, files: &mut Vec<PathBuf>) {
    for entry_res in entries {
        let entry = match entry_res {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Error accessing directory entry; skipping");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Error accessing path; skipping");
                continue;
            }
        };

        if file_type.is_dir() {
            if !recursive {
                continue;
            }
            match std::fs::read_dir(&path) {
                Ok(children) => collect(children, recursive, files),
                Err(e) => warn!(error = %e, path = %path.display(), "Error reading directory; skipping"),
            }
        } else if is_text_file(&path) && path.is_file() {
            debug!(path = %path.display(), "Found text file");
            files.push(path);
        }
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Splits files into (still to convert, already converted) by whether their
/// `.mp3` destination exists.
pub fn partition_converted(files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    files
        .into_iter()
        .partition(|file| !output_path(file).exists())
}
