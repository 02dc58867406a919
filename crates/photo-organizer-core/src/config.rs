//! TOML configuration.
//!
//! Looked up at `--config <FILE>` or `./photo-organizer.toml`. Every field is
//! optional; command-line flags override what the file says.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cleanup::DEFAULT_NUISANCE_FILES;
use crate::date::DatePreference;
use crate::error::ConfigError;
use crate::OrganizeOptions;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "photo-organizer.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Let filename dates win over metadata that disagrees by more than a day
    pub prefer_filename_date: bool,

    /// Set each moved file's mtime to its resolved date
    pub set_mtime: bool,

    /// Remove directories left empty in the source
    pub cleanup_empty_dirs: bool,

    /// Delete OS clutter (Thumbs.db, .DS_Store, ...) before organizing
    pub delete_nuisance_files: bool,

    /// File names treated as clutter, compared case-insensitively
    pub nuisance_files: Vec<String>,

    /// Folder under the destination for files with no date
    pub unknown_dir: String,

    /// Log level: error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefer_filename_date: false,
            set_mtime: false,
            cleanup_empty_dirs: true,
            delete_nuisance_files: true,
            nuisance_files: DEFAULT_NUISANCE_FILES.iter().map(|s| s.to_string()).collect(),
            unknown_dir: "Unknown".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// `./photo-organizer.toml` if present, defaults otherwise.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }
        Ok(Self::default())
    }

    pub fn date_preference(&self) -> DatePreference {
        if self.prefer_filename_date {
            DatePreference::Filename
        } else {
            DatePreference::Metadata
        }
    }

    /// Copy file settings onto run options. Source, destination and
    /// dry-run stay as the caller set them.
    pub fn apply_to(&self, options: &mut OrganizeOptions) {
        options.preference = self.date_preference();
        options.set_mtime = self.set_mtime;
        options.cleanup_empty_dirs = self.cleanup_empty_dirs;
        options.delete_nuisance_files = self.delete_nuisance_files;
        options.nuisance_files = self.nuisance_files.clone();
        options.unknown_dir = self.unknown_dir.clone();
    }
}
