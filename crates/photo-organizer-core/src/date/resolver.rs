use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use super::exif::{ExifPrimary, ExifSecondary};
use super::filesystem::FilesystemDateReader;
use super::guess::FilenameGuesser;
use super::validate::CanonicalDate;
use super::xmp::XmpScanner;
use crate::formats::{DateExtractor, ExtractorRegistry};

/// Metadata and filename dates further apart than this are reported.
pub const MISMATCH_THRESHOLD_SECS: i64 = 24 * 60 * 60;

/// Which stage produced a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// A format-specific extractor, by name
    Format(&'static str),
    ExifPrimary,
    ExifSecondary,
    Xmp,
    Filename,
    Filesystem,
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSource::Format(name) => write!(f, "format:{}", name),
            DateSource::ExifPrimary => write!(f, "exif"),
            DateSource::ExifSecondary => write!(f, "exif-lenient"),
            DateSource::Xmp => write!(f, "xmp"),
            DateSource::Filename => write!(f, "filename"),
            DateSource::Filesystem => write!(f, "filesystem"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { date: CanonicalDate, source: DateSource },
    Unresolved,
}

impl Resolution {
    pub fn date(&self) -> Option<CanonicalDate> {
        match self {
            Resolution::Resolved { date, .. } => Some(*date),
            Resolution::Unresolved => None,
        }
    }

    pub fn source(&self) -> Option<DateSource> {
        match self {
            Resolution::Resolved { source, .. } => Some(*source),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}

/// Tie-break when metadata and filename disagree by more than a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreference {
    /// Embedded metadata wins; the disagreement is only logged.
    #[default]
    Metadata,
    /// The filename wins. Useful for messaging-app exports whose metadata
    /// was rewritten on download.
    Filename,
}

/// The full fallback chain.
#[derive(Clone)]
pub struct DateResolver {
    registry: Arc<ExtractorRegistry>,
    exif_primary: Arc<dyn DateExtractor>,
    exif_secondary: Arc<dyn DateExtractor>,
    xmp: Arc<dyn DateExtractor>,
    filename: Arc<dyn DateExtractor>,
    filesystem: Arc<dyn DateExtractor>,
    preference: DatePreference,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DateResolver {
    pub fn new(preference: DatePreference) -> Self {
        Self::builder().preference(preference).build()
    }

    pub fn builder() -> DateResolverBuilder {
        DateResolverBuilder::default()
    }

    /// Resolve the best creation date for `path`.
    pub fn resolve(&self, path: &Path) -> Resolution {
        let is_video = self.registry.is_video_path(path);

        // 1. Format-specific extractor
        let mut metadata = self.registry.for_path(path).and_then(|r| {
            let name = r.extractor.name();
            run_stage(r.extractor.as_ref(), path).map(|d| (d, DateSource::Format(name)))
        });

        // 2-3. Generic EXIF, two parsers. Videos carry no EXIF.
        if metadata.is_none() && !is_video {
            metadata =
                run_stage(self.exif_primary.as_ref(), path).map(|d| (d, DateSource::ExifPrimary));
        }
        if metadata.is_none() && !is_video {
            metadata = run_stage(self.exif_secondary.as_ref(), path)
                .map(|d| (d, DateSource::ExifSecondary));
        }

        // 4. XMP packet
        if metadata.is_none() {
            metadata = run_stage(self.xmp.as_ref(), path).map(|d| (d, DateSource::Xmp));
        }

        // 5. Filename, always, for the cross-check
        let from_name = run_stage(self.filename.as_ref(), path);

        match (metadata, from_name) {
            (Some((date, source)), Some(name_date)) => {
                let gap = (date.naive() - name_date.naive()).num_seconds().abs();
                if gap > MISMATCH_THRESHOLD_SECS {
                    log::warn!(
                        "Date mismatch for {}: metadata {} ({}) vs filename {}",
                        path.display(),
                        date,
                        source,
                        name_date
                    );
                    if self.preference == DatePreference::Filename {
                        return Resolution::Resolved {
                            date: name_date,
                            source: DateSource::Filename,
                        };
                    }
                }
                Resolution::Resolved { date, source }
            }
            (Some((date, source)), None) => Resolution::Resolved { date, source },
            (None, Some(date)) => Resolution::Resolved {
                date,
                source: DateSource::Filename,
            },
            // 6. Filesystem timestamps
            (None, None) => match run_stage(self.filesystem.as_ref(), path) {
                Some(date) => Resolution::Resolved {
                    date,
                    source: DateSource::Filesystem,
                },
                None => Resolution::Unresolved,
            },
        }
    }

    /// [`resolve`](Self::resolve) plus one human-readable status line.
    pub fn resolve_with_status(&self, path: &Path, status: &mut dyn FnMut(&str)) -> Resolution {
        let resolution = self.resolve(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let line = match resolution {
            Resolution::Resolved { date, source } => format!("{}: {} ({})", name, date, source),
            Resolution::Unresolved => format!("{}: no date found", name),
        };
        status(&line);
        resolution
    }
}

/// A panicking stage is a stage with no answer.
fn run_stage(stage: &dyn DateExtractor, path: &Path) -> Option<CanonicalDate> {
    match panic::catch_unwind(AssertUnwindSafe(|| stage.extract(path))) {
        Ok(date) => date,
        Err(_) => {
            log::error!("[{}] panicked while reading {}", stage.name(), path.display());
            None
        }
    }
}

/// Swap in custom stages; anything left unset uses the built-in one.
#[derive(Default)]
pub struct DateResolverBuilder {
    registry: Option<Arc<ExtractorRegistry>>,
    exif_primary: Option<Arc<dyn DateExtractor>>,
    exif_secondary: Option<Arc<dyn DateExtractor>>,
    xmp: Option<Arc<dyn DateExtractor>>,
    filename: Option<Arc<dyn DateExtractor>>,
    filesystem: Option<Arc<dyn DateExtractor>>,
    preference: DatePreference,
}

impl DateResolverBuilder {
    pub fn registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn exif_primary(mut self, stage: Arc<dyn DateExtractor>) -> Self {
        self.exif_primary = Some(stage);
        self
    }

    pub fn exif_secondary(mut self, stage: Arc<dyn DateExtractor>) -> Self {
        self.exif_secondary = Some(stage);
        self
    }

    pub fn xmp(mut self, stage: Arc<dyn DateExtractor>) -> Self {
        self.xmp = Some(stage);
        self
    }

    pub fn filename(mut self, stage: Arc<dyn DateExtractor>) -> Self {
        self.filename = Some(stage);
        self
    }

    pub fn filesystem(mut self, stage: Arc<dyn DateExtractor>) -> Self {
        self.filesystem = Some(stage);
        self
    }

    pub fn preference(mut self, preference: DatePreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn build(self) -> DateResolver {
        DateResolver {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ExtractorRegistry::standard().clone())),
            exif_primary: self.exif_primary.unwrap_or_else(|| Arc::new(ExifPrimary)),
            exif_secondary: self.exif_secondary.unwrap_or_else(|| Arc::new(ExifSecondary)),
            xmp: self.xmp.unwrap_or_else(|| Arc::new(XmpScanner)),
            filename: self.filename.unwrap_or_else(|| Arc::new(FilenameGuesser)),
            filesystem: self.filesystem.unwrap_or_else(|| Arc::new(FilesystemDateReader)),
            preference: self.preference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::validate;
    use crate::error::ExtractError;
    use crate::formats::MediaKind;
    use crate::testutil::{capture_logs, jpeg_with_date, warnings_mentioning, write_temp};
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    /// Records every call in a shared log and returns a fixed answer.
    struct Stage {
        name: &'static str,
        answer: Option<&'static str>,
        panics: bool,
        log: CallLog,
    }

    impl Stage {
        fn new(name: &'static str, answer: Option<&'static str>, log: &CallLog) -> Arc<Self> {
            Arc::new(Stage {
                name,
                answer,
                panics: false,
                log: Arc::clone(log),
            })
        }

        fn panicking(name: &'static str, log: &CallLog) -> Arc<Self> {
            Arc::new(Stage {
                name,
                answer: None,
                panics: true,
                log: Arc::clone(log),
            })
        }
    }

    impl DateExtractor for Stage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn read(&self, _path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
            self.log.lock().unwrap().push(self.name);
            if self.panics {
                panic!("corrupt input in {}", self.name);
            }
            Ok(validate(self.answer))
        }
    }

    fn resolver_with(
        log: &CallLog,
        registry: ExtractorRegistry,
        primary: Option<&'static str>,
        preference: DatePreference,
    ) -> DateResolver {
        DateResolver::builder()
            .registry(registry)
            .exif_primary(Stage::new("primary", primary, log))
            .exif_secondary(Stage::new("secondary", None, log))
            .xmp(Stage::new("xmp", None, log))
            .filesystem(Stage::new("filesystem", Some("2000:01:01 00:00:00"), log))
            .preference(preference)
            .build()
    }

    #[test]
    fn test_metadata_wins_with_mismatch() {
        let log = CallLog::default();
        let resolver = resolver_with(
            &log,
            ExtractorRegistry::default(),
            Some("2021:07:04 09:15:00"),
            DatePreference::Metadata,
        );
        let res = resolver.resolve(Path::new("/in/IMG_20210101_120000.jpg"));
        assert_eq!(res.date().unwrap().to_string(), "2021:07:04 09:15:00");
        assert_eq!(res.source(), Some(DateSource::ExifPrimary));
        // later metadata stages and the filesystem are never consulted
        assert_eq!(*log.lock().unwrap(), vec!["primary"]);
    }

    #[test]
    fn test_mismatch_warning() {
        capture_logs();
        let log = CallLog::default();
        let resolver = resolver_with(
            &log,
            ExtractorRegistry::default(),
            Some("2021:07:04 09:15:00"),
            DatePreference::Metadata,
        );

        resolver.resolve(Path::new("/mismatch/far/IMG_20210101_120000.jpg"));
        let warnings = warnings_mentioning("/mismatch/far/");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("2021:07:04 09:15:00"));
        assert!(warnings[0].contains("2021:01:01 12:00:00"));

        // 2h45m apart: no warning
        resolver.resolve(Path::new("/mismatch/near/IMG_20210704_120000.jpg"));
        assert!(warnings_mentioning("/mismatch/near/").is_empty());
    }

    #[test]
    fn test_filename_preference_on_mismatch() {
        let log = CallLog::default();
        let resolver = resolver_with(
            &log,
            ExtractorRegistry::default(),
            Some("2021:07:04 09:15:00"),
            DatePreference::Filename,
        );
        let res = resolver.resolve(Path::new("/in/IMG_20210101_120000.jpg"));
        assert_eq!(res.date().unwrap().to_string(), "2021:01:01 12:00:00");
        assert_eq!(res.source(), Some(DateSource::Filename));

        // within a day, metadata stays even with the filename preference
        let res = resolver.resolve(Path::new("/in/IMG_20210704_120000.jpg"));
        assert_eq!(res.source(), Some(DateSource::ExifPrimary));
    }

    #[test]
    fn test_video_skips_generic_exif() {
        let log = CallLog::default();
        let registry = ExtractorRegistry::builder()
            .register(".mp4", MediaKind::Video, Stage::new("video", None, &log))
            .unwrap()
            .build();
        let resolver = DateResolver::builder()
            .registry(registry)
            .exif_primary(Stage::new("primary", Some("2020:01:01 00:00:00"), &log))
            .exif_secondary(Stage::new("secondary", Some("2020:01:01 00:00:00"), &log))
            .xmp(Stage::new("xmp", None, &log))
            .filesystem(Stage::new("filesystem", None, &log))
            .build();

        let res = resolver.resolve(Path::new("/in/clip.MP4"));
        assert_eq!(res, Resolution::Unresolved);
        assert_eq!(*log.lock().unwrap(), vec!["video", "xmp", "filesystem"]);
    }

    #[test]
    fn test_unresolvable_file_tries_filesystem_last() {
        let log = CallLog::default();
        let resolver = DateResolver::builder()
            .registry(ExtractorRegistry::default())
            .exif_primary(Stage::new("primary", None, &log))
            .exif_secondary(Stage::new("secondary", None, &log))
            .xmp(Stage::new("xmp", None, &log))
            .filename(Stage::new("filename", None, &log))
            .filesystem(Stage::new("filesystem", None, &log))
            .build();

        assert_eq!(resolver.resolve(Path::new("a.xyz")), Resolution::Unresolved);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["primary", "secondary", "xmp", "filename", "filesystem"]
        );
    }

    #[test]
    fn test_filesystem_used_when_nothing_else() {
        let log = CallLog::default();
        let resolver =
            resolver_with(&log, ExtractorRegistry::default(), None, DatePreference::Metadata);
        let res = resolver.resolve(Path::new("vacation.jpg"));
        assert_eq!(res.source(), Some(DateSource::Filesystem));
        assert_eq!(res.date().unwrap().to_string(), "2000:01:01 00:00:00");
    }

    #[test]
    fn test_panicking_extractor_is_isolated() {
        let log = CallLog::default();
        let registry = ExtractorRegistry::builder()
            .register(".png", MediaKind::Image, Stage::panicking("png", &log))
            .unwrap()
            .build();
        let resolver = resolver_with(
            &log,
            registry,
            Some("2019:05:05 05:05:05"),
            DatePreference::Metadata,
        );

        let res = resolver.resolve(Path::new("shot.png"));
        assert_eq!(res.source(), Some(DateSource::ExifPrimary));
        assert_eq!(res.date().unwrap().to_string(), "2019:05:05 05:05:05");
        assert_eq!(*log.lock().unwrap(), vec!["png", "primary"]);
    }

    #[test]
    fn test_format_extractor_source_name() {
        let log = CallLog::default();
        let registry = ExtractorRegistry::builder()
            .register(
                ".gif",
                MediaKind::Image,
                Stage::new("gif", Some("2018:08:08 08:08:08"), &log),
            )
            .unwrap()
            .build();
        let resolver = resolver_with(&log, registry, None, DatePreference::Metadata);
        let res = resolver.resolve(Path::new("anim.GIF"));
        assert_eq!(res.source(), Some(DateSource::Format("gif")));
        assert_eq!(res.source().unwrap().to_string(), "format:gif");
    }

    #[test]
    fn test_standard_chain_on_real_files() {
        let resolver = DateResolver::default();

        let (_dir, path) = write_temp("photo.jpg", &jpeg_with_date("2021:07:04 09:15:00"));
        let res = resolver.resolve(&path);
        assert_eq!(res.date().unwrap().to_string(), "2021:07:04 09:15:00");
        assert_eq!(res.source(), Some(DateSource::ExifPrimary));

        let (_dir, path) = write_temp("IMG_20230615_143022.jpg", b"");
        let res = resolver.resolve(&path);
        assert_eq!(res.date().unwrap().to_string(), "2023:06:15 14:30:22");
        assert_eq!(res.source(), Some(DateSource::Filename));

        let (_dir, path) = write_temp("notes.xyz", b"hello");
        assert_eq!(resolver.resolve(&path).source(), Some(DateSource::Filesystem));
    }

    #[test]
    fn test_resolve_with_status() {
        let log = CallLog::default();
        let resolver = resolver_with(
            &log,
            ExtractorRegistry::default(),
            Some("2021:07:04 09:15:00"),
            DatePreference::Metadata,
        );
        let mut lines = Vec::new();
        let res =
            resolver.resolve_with_status(Path::new("/x/a.jpg"), &mut |s| lines.push(s.to_string()));
        assert!(res.is_resolved());
        assert_eq!(lines, vec!["a.jpg: 2021:07:04 09:15:00 (exif)".to_string()]);
    }
}
