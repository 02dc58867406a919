use std::path::Path;

use walkdir::WalkDir;

use crate::media::MediaFile;

/// Every regular file under `source`, sorted by path. When `exclude` lies
/// inside `source` (destination nested in the source) it is not descended.
pub fn scan_source(source: &Path, exclude: Option<&Path>) -> Vec<MediaFile> {
    let mut files = Vec::new();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |ex| e.path() != ex));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        files.push(MediaFile::new(entry.into_path()));
    }

    files
}
