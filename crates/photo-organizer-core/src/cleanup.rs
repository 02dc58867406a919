use std::fs;
use std::path::Path;

use walkdir::WalkDir;

/// OS-generated clutter removed before organizing.
pub const DEFAULT_NUISANCE_FILES: &[&str] = &["thumbs.db", "desktop.ini", ".ds_store", "desktop"];

pub fn is_nuisance(file_name: &str, names: &[String]) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(file_name))
}

/// Delete files whose name matches `names` (case-insensitive).
/// Returns how many were deleted, or would be in a dry run.
pub fn delete_nuisance_files(root: &Path, names: &[String], dry_run: bool) -> u64 {
    let mut deleted = 0;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if !is_nuisance(&entry.file_name().to_string_lossy(), names) {
            continue;
        }
        if dry_run {
            log::info!("Would delete unwanted file: {}", entry.path().display());
            deleted += 1;
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                log::info!("Deleted unwanted file: {}", entry.path().display());
                deleted += 1;
            }
            Err(e) => log::error!("Could not delete {}: {}", entry.path().display(), e),
        }
    }

    deleted
}

/// Remove empty directories below `root`, deepest first, so a directory
/// holding only empty directories goes too. `root` itself is kept.
pub fn remove_empty_dirs(root: &Path) -> u64 {
    let mut removed = 0;

    let dirs = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir());

    for entry in dirs {
        let is_empty = fs::read_dir(entry.path())
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        match fs::remove_dir(entry.path()) {
            Ok(()) => {
                log::info!("Removed empty directory: {}", entry.path().display());
                removed += 1;
            }
            Err(e) => log::warn!("Could not remove directory {}: {}", entry.path().display(), e),
        }
    }

    removed
}
