use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::validate::CanonicalDate;
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// Last resort: birth time where the platform records it, else mtime.
pub fn filesystem_date(path: &Path) -> Option<CanonicalDate> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            log::debug!("Could not stat {}: {}", path.display(), e);
            return None;
        }
    };

    let created = meta.created().ok().and_then(from_system_time);
    if created.is_some() {
        return created;
    }
    meta.modified().ok().and_then(from_system_time)
}

/// Local wall time of `t`. Times at or before the epoch count as unset.
pub fn from_system_time(t: SystemTime) -> Option<CanonicalDate> {
    let secs = t.duration_since(UNIX_EPOCH).ok()?.as_secs();
    if secs == 0 {
        return None;
    }
    let secs = i64::try_from(secs).ok()?;
    let local = chrono::DateTime::from_timestamp(secs, 0)?
        .with_timezone(&chrono::Local)
        .naive_local();
    CanonicalDate::from_naive(local)
}

#[derive(Debug, Default)]
pub struct FilesystemDateReader;

impl DateExtractor for FilesystemDateReader {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        Ok(filesystem_date(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use std::time::Duration;

    #[test]
    fn test_from_system_time() {
        assert!(from_system_time(UNIX_EPOCH).is_none());
        assert!(from_system_time(UNIX_EPOCH - Duration::from_secs(10)).is_none());
        // 1985 is before the valid range
        assert!(from_system_time(UNIX_EPOCH + Duration::from_secs(500_000_000)).is_none());

        let expected = chrono::Local.with_ymd_and_hms(2015, 6, 15, 12, 0, 0).unwrap();
        let t = UNIX_EPOCH + Duration::from_secs(expected.timestamp() as u64);
        let date = from_system_time(t).unwrap();
        assert_eq!(date.naive(), expected.naive_local());
    }

    #[test]
    fn test_reads_file_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xyz");
        fs::write(&path, b"x").unwrap();
        let date = filesystem_date(&path).unwrap();
        assert!(date.year() >= chrono::Local::now().year() - 1);
        assert_eq!(FilesystemDateReader.extract(&path), Some(date));
    }

    #[test]
    fn test_missing_file() {
        assert!(filesystem_date(Path::new("/nonexistent/a.xyz")).is_none());
    }
}
