//! Format-specific date extractors and the extension registry that picks one.

pub mod heif;
pub mod image;
pub mod raw;
pub mod video;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::date::CanonicalDate;
use crate::error::{ExtractError, RegistryError};

pub use self::heif::{HeifExtractor, HeifSupport};
pub use self::image::{BmpExtractor, EmbeddedExifExtractor, GifCommentExtractor, PngTextExtractor};
pub use self::raw::RawExtractor;
pub use self::video::VideoExtractor;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".gif", ".webp", ".tif", ".tiff", ".jp2", ".j2k", ".jpf", ".jpx", ".mpo", ".avif",
    ".heic", ".heif", ".bmp",
];

pub const RAW_EXTENSIONS: &[&str] = &[
    ".dng", ".cr2", ".cr3", ".nef", ".arw", ".orf", ".rw2", ".raf",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[".mov", ".mp4", ".m4v", ".3gp", ".avi", ".mkv", ".webm"];

const EMBEDDED_EXIF_EXTENSIONS: &[&str] = &[
    ".webp", ".tif", ".tiff", ".jp2", ".j2k", ".jpf", ".jpx", ".mpo", ".avif",
];

/// One way of getting a creation date out of a file.
pub trait DateExtractor: Send + Sync {
    /// Short identifier used in logs and [`crate::date::DateSource::Format`].
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the file simply carries no usable date.
    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError>;

    /// [`read`](Self::read) with errors logged and swallowed.
    fn extract(&self, path: &Path) -> Option<CanonicalDate> {
        match self.read(path) {
            Ok(Some(date)) => {
                log::debug!("[{}] {} -> {}", self.name(), path.display(), date);
                Some(date)
            }
            Ok(None) => {
                log::debug!("[{}] no date in {}", self.name(), path.display());
                None
            }
            Err(e) if e.is_malformed() => {
                log::debug!("[{}] malformed metadata in {}: {}", self.name(), path.display(), e);
                None
            }
            Err(e) => {
                log::error!("[{}] failed to read {}: {}", self.name(), path.display(), e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Raw,
    Video,
}

#[derive(Clone)]
pub struct RegisteredExtractor {
    pub kind: MediaKind,
    pub extractor: Arc<dyn DateExtractor>,
}

impl fmt::Debug for RegisteredExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredExtractor")
            .field("kind", &self.kind)
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

/// Immutable extension → extractor table.
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    entries: HashMap<String, RegisteredExtractor>,
}

static STANDARD: LazyLock<ExtractorRegistry> = LazyLock::new(|| {
    standard_registry().expect("built-in extractor table has unique, well-formed extensions")
});

impl ExtractorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The built-in table, created on first use.
    pub fn standard() -> &'static ExtractorRegistry {
        &STANDARD
    }

    /// Look up by extension, with or without the dot, any case.
    pub fn get(&self, ext: &str) -> Option<&RegisteredExtractor> {
        self.entries.get(&normalize_extension(ext))
    }

    pub fn for_path(&self, path: &Path) -> Option<&RegisteredExtractor> {
        let ext = path.extension()?.to_str()?;
        self.get(ext)
    }

    pub fn is_video(&self, ext: &str) -> bool {
        matches!(self.get(ext), Some(r) if r.kind == MediaKind::Video)
    }

    pub fn is_video_path(&self, path: &Path) -> bool {
        matches!(self.for_path(path), Some(r) if r.kind == MediaKind::Video)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, RegisteredExtractor>,
}

impl RegistryBuilder {
    /// `ext` must already be in registry form: lowercase with a leading dot.
    pub fn register(
        mut self,
        ext: &str,
        kind: MediaKind,
        extractor: Arc<dyn DateExtractor>,
    ) -> Result<Self, RegistryError> {
        let valid = ext.len() > 1
            && ext.starts_with('.')
            && ext[1..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid {
            return Err(RegistryError::InvalidExtension(ext.to_string()));
        }
        if self.entries.contains_key(ext) {
            return Err(RegistryError::DuplicateExtension(ext.to_string()));
        }
        self.entries
            .insert(ext.to_string(), RegisteredExtractor { kind, extractor });
        Ok(self)
    }

    pub fn register_all(
        mut self,
        exts: &[&str],
        kind: MediaKind,
        extractor: Arc<dyn DateExtractor>,
    ) -> Result<Self, RegistryError> {
        for ext in exts {
            self = self.register(ext, kind, Arc::clone(&extractor))?;
        }
        Ok(self)
    }

    pub fn build(self) -> ExtractorRegistry {
        ExtractorRegistry {
            entries: self.entries,
        }
    }
}

fn standard_registry() -> Result<ExtractorRegistry, RegistryError> {
    Ok(ExtractorRegistry::builder()
        .register(".png", MediaKind::Image, Arc::new(PngTextExtractor))?
        .register(".gif", MediaKind::Image, Arc::new(GifCommentExtractor))?
        .register_all(EMBEDDED_EXIF_EXTENSIONS, MediaKind::Image, Arc::new(EmbeddedExifExtractor))?
        .register_all(&[".heic", ".heif"], MediaKind::Image, Arc::new(HeifExtractor))?
        .register(".bmp", MediaKind::Image, Arc::new(BmpExtractor))?
        .register_all(RAW_EXTENSIONS, MediaKind::Raw, Arc::new(RawExtractor))?
        .register_all(VIDEO_EXTENSIONS, MediaKind::Video, Arc::new(VideoExtractor::default()))?
        .build())
}

fn normalize_extension(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}
