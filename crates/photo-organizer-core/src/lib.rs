pub mod cleanup;
pub mod config;
pub mod date;
pub mod error;
pub mod formats;
pub mod media;
pub mod scan;
pub mod writer;

#[cfg(test)]
mod testutil;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use config::Config;
pub use date::{CanonicalDate, DatePreference, DateResolver, DateSource, Resolution};
pub use error::{OrganizerError, Result};
pub use media::MediaFile;

fn default_true() -> bool {
    true
}

fn default_nuisance_files() -> Vec<String> {
    cleanup::DEFAULT_NUISANCE_FILES.iter().map(|s| s.to_string()).collect()
}

fn default_unknown_dir() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub preference: DatePreference,
    #[serde(default)]
    pub set_mtime: bool,
    #[serde(default = "default_true")]
    pub cleanup_empty_dirs: bool,
    #[serde(default = "default_true")]
    pub delete_nuisance_files: bool,
    #[serde(default = "default_nuisance_files")]
    pub nuisance_files: Vec<String>,
    #[serde(default = "default_unknown_dir")]
    pub unknown_dir: String,
}

impl OrganizeOptions {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            dry_run: false,
            preference: DatePreference::default(),
            set_mtime: false,
            cleanup_empty_dirs: true,
            delete_nuisance_files: true,
            nuisance_files: default_nuisance_files(),
            unknown_dir: default_unknown_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub stage: String,
    pub current: u64,
    pub total: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeResult {
    pub total_files: u64,
    /// Files moved into a `YYYY/MM` folder
    pub moved: u64,
    /// Files moved into the unknown-date folder
    pub unknown: u64,
    pub failed: u64,
    pub nuisance_deleted: u64,
    pub directories_removed: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Type alias for progress callback. `message` carries one status line per
/// resolved file.
pub type ProgressCallback<'a> = dyn Fn(&Progress) + Send + Sync + 'a;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(&Progress {
            stage: stage.to_string(),
            current,
            total,
            message: message.to_string(),
        });
    }
}

/// Source and destination after validation, both absolute.
struct Roots {
    source: PathBuf,
    destination: PathBuf,
}

fn check_roots(source: &Path, destination: &Path) -> Result<Roots> {
    if !source.exists() {
        return Err(OrganizerError::MissingSource(source.to_path_buf()));
    }
    if !source.is_dir() {
        return Err(OrganizerError::SourceNotDirectory(source.to_path_buf()));
    }
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| OrganizerError::Io { path, source }
    };
    let source = fs::canonicalize(source).map_err(io_err(source))?;
    let destination = if destination.exists() {
        fs::canonicalize(destination).map_err(io_err(destination))?
    } else {
        std::path::absolute(destination).map_err(io_err(destination))?
    };
    if source == destination {
        return Err(OrganizerError::SameDirectory(source));
    }
    Ok(Roots { source, destination })
}

/// Walk `source` and resolve a date for every file, in parallel.
/// `exclude` (a destination nested in the source) is not walked.
pub fn resolve_tree(
    source: &Path,
    exclude: Option<&Path>,
    resolver: &DateResolver,
    progress: &ProgressCallback<'_>,
) -> Result<Vec<MediaFile>> {
    if !source.is_dir() {
        return Err(OrganizerError::SourceNotDirectory(source.to_path_buf()));
    }
    let tp = ThrottledProgress::new(progress);
    let mut media = scan::scan_source(source, exclude);
    resolve_media(&mut media, resolver, &tp);
    Ok(media)
}

fn resolve_media(media: &mut [MediaFile], resolver: &DateResolver, tp: &ThrottledProgress<'_>) {
    let total = media.len() as u64;
    let counter = AtomicU64::new(0);
    media.par_iter_mut().for_each(|m| {
        let current = counter.fetch_add(1, Ordering::Relaxed);
        let resolution = resolver
            .resolve_with_status(&m.path, &mut |line| tp.report("resolve", current, total, line));
        m.apply(resolution);
    });
}

/// Organize `options.source` into `options.destination` with the built-in
/// resolver.
pub fn organize(
    options: &OrganizeOptions,
    progress: &ProgressCallback<'_>,
) -> Result<OrganizeResult> {
    let resolver = DateResolver::new(options.preference);
    organize_with(options, &resolver, progress)
}

/// Run the full pipeline with a caller-supplied resolver.
pub fn organize_with(
    options: &OrganizeOptions,
    resolver: &DateResolver,
    progress: &ProgressCallback<'_>,
) -> Result<OrganizeResult> {
    let tp = ThrottledProgress::new(progress);
    let roots = check_roots(&options.source, &options.destination)?;
    log::info!("Origin directory: {}", roots.source.display());
    log::info!("Destination directory: {}", roots.destination.display());

    let mut result = OrganizeResult::default();

    // Stage 1: clutter
    if options.delete_nuisance_files {
        result.nuisance_deleted =
            cleanup::delete_nuisance_files(&roots.source, &options.nuisance_files, options.dry_run);
    }

    // Stage 2: scan + resolve
    let exclude = roots
        .destination
        .starts_with(&roots.source)
        .then_some(roots.destination.as_path());
    let mut media = scan::scan_source(&roots.source, exclude);
    if options.delete_nuisance_files {
        // still present in a dry run
        media.retain(|m| !cleanup::is_nuisance(&m.filename, &options.nuisance_files));
    }
    result.total_files = media.len() as u64;
    tp.report("scan", 0, 1, &format!("Found {} files", media.len()));
    if media.is_empty() {
        return Ok(result);
    }
    resolve_media(&mut media, resolver, &tp);

    // Stage 3: destinations (sequential, collision tracking)
    if !options.dry_run {
        fs::create_dir_all(&roots.destination).map_err(|source| OrganizerError::Io {
            path: roots.destination.clone(),
            source,
        })?;
    }
    let assignments = writer::assign_destinations(&media, &roots.destination, &options.unknown_dir);

    // Stage 4: moves
    let summary =
        writer::move_all(&media, &assignments, options.set_mtime, options.dry_run, &tp);
    result.moved = summary.moved;
    result.unknown = summary.unknown;
    result.failed = summary.failed;
    result.warnings = summary.warnings;

    // Stage 5: empty directories left behind
    if options.cleanup_empty_dirs && !options.dry_run {
        result.directories_removed = cleanup::remove_empty_dirs(&roots.source);
    }

    log::info!(
        "Organized {} files: {} dated, {} unknown, {} failed",
        result.total_files,
        result.moved,
        result.unknown,
        result.failed
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let callback = move |p: &Progress| sink.lock().unwrap().push((p.current, p.total));
        let tp = ThrottledProgress::new(&callback);
        for i in 0..100 {
            tp.report("resolve", i, 100, "x");
        }
        let seen = seen.lock().unwrap();
        // first call passes the throttle, the last is the completion
        assert_eq!(seen.first(), Some(&(0, 100)));
        assert_eq!(seen.last(), Some(&(99, 100)));
        assert!(seen.len() < 100);
    }

    #[test]
    fn test_check_roots() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(dir.path().join("file"), b"").unwrap();

        assert!(matches!(
            check_roots(&dir.path().join("nope"), dir.path()),
            Err(OrganizerError::MissingSource(_))
        ));
        assert!(matches!(
            check_roots(&dir.path().join("file"), dir.path()),
            Err(OrganizerError::SourceNotDirectory(_))
        ));
        assert!(matches!(
            check_roots(&src, &src.join("../src")),
            Err(OrganizerError::SameDirectory(_))
        ));
        let roots = check_roots(&src, &dir.path().join("out")).unwrap();
        assert!(roots.destination.is_absolute());
    }

    #[test]
    fn test_options_serde_defaults() {
        let json = r#"{"source":"/in","destination":"/out"}"#;
        let options: OrganizeOptions = serde_json::from_str(json).unwrap();
        assert!(options.cleanup_empty_dirs);
        assert!(!options.dry_run);
        assert_eq!(options.preference, DatePreference::Metadata);
        assert_eq!(options.unknown_dir, "Unknown");
    }
}
