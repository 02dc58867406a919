use std::path::Path;
use std::sync::OnceLock;

use crate::date::CanonicalDate;
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// Whether libheif was compiled in. Resolved once per process.
#[derive(Debug)]
pub struct HeifSupport {
    available: bool,
}

static SUPPORT: OnceLock<HeifSupport> = OnceLock::new();

impl HeifSupport {
    pub fn get() -> &'static HeifSupport {
        SUPPORT.get_or_init(|| {
            let available = cfg!(feature = "heif");
            if !available {
                log::warn!(
                    "HEIF support not built in (enable the `heif` feature); \
                     HEIC/HEIF dates come from the generic EXIF readers only"
                );
            }
            HeifSupport { available }
        })
    }

    pub fn available(&self) -> bool {
        self.available
    }
}

/// HEIC/HEIF EXIF blocks read through libheif.
#[derive(Debug, Default)]
pub struct HeifExtractor;

impl DateExtractor for HeifExtractor {
    fn name(&self) -> &'static str {
        "heif"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        if !HeifSupport::get().available() {
            return Ok(None);
        }
        read_heif(path)
    }
}

#[cfg(feature = "heif")]
fn read_heif(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    use crate::date::exif::{date_from_exif, parse_tiff_block, DATE_TAGS};
    use libheif_rs::HeifContext;

    let path_str = path
        .to_str()
        .ok_or_else(|| ExtractError::Heif(format!("non UTF-8 path: {}", path.display())))?;
    let ctx = HeifContext::read_from_file(path_str).map_err(|e| ExtractError::Heif(e.to_string()))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| ExtractError::Heif(e.to_string()))?;

    let count = handle.number_of_metadata_blocks(0);
    if count <= 0 {
        return Ok(None);
    }
    let mut ids = vec![0; count as usize];
    let count = handle.metadata_block_ids(&mut ids, 0);

    for &id in ids.iter().take(count) {
        if handle.metadata_type(id) != Some("Exif") {
            continue;
        }
        let Ok(data) = handle.metadata(id) else {
            continue;
        };
        let Some(tiff) = tiff_payload(&data) else {
            continue;
        };
        let exif = parse_tiff_block(tiff.to_vec())?;
        if let Some(date) = date_from_exif(&exif, &DATE_TAGS) {
            return Ok(Some(date));
        }
    }

    Ok(None)
}

#[cfg(not(feature = "heif"))]
fn read_heif(_path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    Ok(None)
}

/// HEIF Exif items start with a 4-byte big-endian offset to the TIFF
/// header; some writers put `Exif\0\0` there instead.
#[cfg_attr(not(feature = "heif"), allow(dead_code))]
fn tiff_payload(data: &[u8]) -> Option<&[u8]> {
    if let Some(rest) = data.strip_prefix(b"Exif\0\0") {
        return Some(rest);
    }
    let offset = u32::from_be_bytes(data.get(..4)?.try_into().ok()?) as usize;
    let rest = data.get(4usize.checked_add(offset)?..)?;
    let rest = rest.strip_prefix(b"Exif\0\0").unwrap_or(rest);
    (rest.starts_with(b"II*\0") || rest.starts_with(b"MM\0*")).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_is_stable() {
        let first = HeifSupport::get().available();
        assert_eq!(first, cfg!(feature = "heif"));
        assert_eq!(HeifSupport::get().available(), first);
        assert!(std::ptr::eq(HeifSupport::get(), HeifSupport::get()));
    }

    #[test]
    fn test_unreadable_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.heic");
        std::fs::write(&path, b"\0\0\0\x18ftypheic").unwrap();
        assert!(HeifExtractor.extract(&path).is_none());
    }

    #[test]
    fn test_tiff_payload_offsets() {
        let mut item = vec![0, 0, 0, 6];
        item.extend_from_slice(b"Exif\0\0II*\0rest");
        assert!(tiff_payload(&item).unwrap().starts_with(b"II*\0"));

        let mut item = vec![0, 0, 0, 0];
        item.extend_from_slice(b"MM\0*rest");
        assert!(tiff_payload(&item).unwrap().starts_with(b"MM\0*"));

        assert!(tiff_payload(b"Exif\0\0MM\0*").is_some());
        assert!(tiff_payload(&[0, 0, 0, 99, 1, 2]).is_none());
        assert!(tiff_payload(&[0, 0]).is_none());
    }
}
