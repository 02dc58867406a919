//! Error types for the date engine and the organizer.
//!
//! Extraction errors never leave a stage: `DateExtractor::extract` logs them
//! and reports "no date". Organizer errors are the only ones a caller sees.

use std::path::PathBuf;

use thiserror::Error;

/// Failure inside a single date-extraction stage.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed EXIF: {0}")]
    MalformedExif(String),

    #[error("image decoder: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG decoder: {0}")]
    Png(#[from] png::DecodingError),

    #[error("media parser: {0}")]
    Media(#[from] nom_exif::Error),

    #[error("libheif: {0}")]
    Heif(String),

    #[error("malformed {format} data: {reason}")]
    Malformed { format: &'static str, reason: String },
}

impl ExtractError {
    /// Corrupt or non-standard metadata. Common in real photo libraries, so
    /// these are logged at debug level rather than as errors.
    pub fn is_malformed(&self) -> bool {
        match self {
            ExtractError::Io(_) | ExtractError::Heif(_) => false,
            ExtractError::Image(image::ImageError::IoError(_)) => false,
            _ => true,
        }
    }

    pub(crate) fn malformed(format: &'static str, reason: impl Into<String>) -> Self {
        ExtractError::Malformed {
            format,
            reason: reason.into(),
        }
    }
}

impl From<exif::Error> for ExtractError {
    fn from(err: exif::Error) -> Self {
        match err {
            exif::Error::Io(e) => ExtractError::Io(e),
            other => ExtractError::MalformedExif(other.to_string()),
        }
    }
}

/// Problems building an extractor registry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("extension '{0}' is registered twice")]
    DuplicateExtension(String),

    #[error("extension '{0}' must be lowercase and start with a dot")]
    InvalidExtension(String),
}

/// Configuration file problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Errors that stop an organize run before or while it starts.
#[derive(Error, Debug)]
pub enum OrganizerError {
    #[error("source directory does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("source path is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("source and destination directories cannot be the same: {0}")]
    SameDirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, OrganizerError>;
