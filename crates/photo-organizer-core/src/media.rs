use std::path::PathBuf;

use crate::date::{CanonicalDate, DateSource, Resolution};

#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Absolute path in the source tree
    pub path: PathBuf,
    /// Just the filename
    pub filename: String,
    /// Resolved creation date, `None` until resolved or if unresolvable
    pub date: Option<CanonicalDate>,
    /// Which stage produced `date`
    pub source: Option<DateSource>,
}

impl MediaFile {
    pub fn new(path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            filename,
            date: None,
            source: None,
        }
    }

    pub fn apply(&mut self, resolution: Resolution) {
        self.date = resolution.date();
        self.source = resolution.source();
    }
}
