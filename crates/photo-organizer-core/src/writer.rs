use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::date::CanonicalDate;
use crate::media::MediaFile;
use crate::ThrottledProgress;

/// Recursively scan directory for existing files (for fast exists checks).
fn scan_existing_files(dir: &Path) -> HashSet<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

/// `<dest>/<YYYY>/<MM>` for a dated file, `<dest>/<unknown_dir>` otherwise.
pub fn destination_dir(
    dest_root: &Path,
    date: Option<&CanonicalDate>,
    unknown_dir: &str,
) -> PathBuf {
    match date {
        Some(dt) => dest_root
            .join(format!("{:04}", dt.year()))
            .join(format!("{:02}", dt.month())),
        None => dest_root.join(unknown_dir),
    }
}

/// Assign a unique destination path to every file, in order.
///
/// A name already taken on disk or earlier in this run becomes
/// `<stem>_<n>.<ext>` with the lowest free `n`.
pub fn assign_destinations(
    media: &[MediaFile],
    dest_root: &Path,
    unknown_dir: &str,
) -> Vec<PathBuf> {
    let existing_files = if dest_root.exists() {
        scan_existing_files(dest_root)
    } else {
        HashSet::new()
    };

    // Counters per base path avoid rescanning already used suffixes
    let mut name_counters: HashMap<PathBuf, u32> = HashMap::new();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut assignments = Vec::with_capacity(media.len());

    for m in media {
        let sub_dir = destination_dir(dest_root, m.date.as_ref(), unknown_dir);
        let base_dest = sub_dir.join(&m.filename);
        let taken = |p: &PathBuf| used_paths.contains(p) || existing_files.contains(p);

        let dest = if !taken(&base_dest) {
            base_dest
        } else {
            let counter = name_counters.entry(base_dest).or_insert(0);
            loop {
                *counter += 1;
                let candidate = sub_dir.join(numbered_name(&m.filename, *counter));
                if !taken(&candidate) {
                    break candidate;
                }
            }
        };

        used_paths.insert(dest.clone());
        assignments.push(dest);
    }

    assignments
}

/// `<stem>_<n>.<ext>`, or `<stem>_<n>` without an extension.
fn numbered_name(filename: &str, n: u32) -> String {
    let name = Path::new(filename);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    match name.extension().and_then(|s| s.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}_{}.{}", stem, n, ext),
        _ => format!("{}_{}", stem, n),
    }
}

/// Move `src` to `dest`, creating parent directories. Falls back to copy
/// and delete when a rename is not possible (different filesystems).
pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination exists: {}", dest.display()),
        ));
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            log::debug!("rename {} failed ({}), copying instead", src.display(), rename_err);
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Set the file's mtime to `date` interpreted as local time.
pub fn set_mtime(path: &Path, date: &CanonicalDate) -> io::Result<()> {
    let Some(local) = date.naive().and_local_timezone(chrono::Local).single() else {
        return Ok(());
    };
    let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
    filetime::set_file_mtime(path, ft)
}

/// [`move_file`], stepping to the next free `<stem>_<n>` when `dest` was
/// taken after assignment. Case-insensitive filesystems fold `IMG.JPG` and
/// `img.jpg` into one name. Returns where the file ended up.
fn move_to_free_name(src: &Path, dest: &Path, filename: &str) -> io::Result<PathBuf> {
    match move_file(src, dest) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        other => return other.map(|()| dest.to_path_buf()),
    }
    let dir = dest.parent().unwrap_or(Path::new(""));
    let mut n = 0;
    loop {
        n += 1;
        let candidate = dir.join(numbered_name(filename, n));
        match move_file(src, &candidate) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            other => return other.map(|()| candidate),
        }
    }
}

/// Outcome of the move phase.
#[derive(Debug, Default)]
pub struct MoveSummary {
    pub moved: u64,
    pub unknown: u64,
    pub failed: u64,
    pub warnings: Vec<String>,
}

/// Move every file to its assigned destination. Failures are counted and
/// logged, never fatal.
pub fn move_all(
    media: &[MediaFile],
    assignments: &[PathBuf],
    set_file_mtime: bool,
    dry_run: bool,
    progress: &ThrottledProgress<'_>,
) -> MoveSummary {
    let mut summary = MoveSummary::default();
    let total = media.len() as u64;

    for (i, (m, dest)) in media.iter().zip(assignments).enumerate() {
        progress.report("move", i as u64, total, &m.filename);

        let dest = if dry_run {
            log::info!("Would move {} -> {}", m.path.display(), dest.display());
            dest.clone()
        } else {
            match move_to_free_name(&m.path, dest, &m.filename) {
                Ok(actual) => {
                    log::info!("Moved file: {} -> {}", m.filename, actual.display());
                    actual
                }
                Err(e) => {
                    log::error!("Error moving file {}: {}", m.path.display(), e);
                    summary.failed += 1;
                    summary.warnings.push(format!("{}: {}", m.path.display(), e));
                    continue;
                }
            }
        };

        match &m.date {
            Some(date) => {
                if set_file_mtime && !dry_run {
                    if let Err(e) = set_mtime(&dest, date) {
                        log::warn!("Could not set mtime on {}: {}", dest.display(), e);
                    }
                }
                summary.moved += 1;
            }
            None => summary.unknown += 1,
        }
    }

    summary
}
