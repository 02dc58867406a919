//! Camera RAW files. Most are TIFF underneath; the rest wrap a TIFF block
//! somewhere we can find without a full decoder.

use std::path::Path;

use crate::date::CanonicalDate;
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// Upper bound on how much of a RAW file is read. Date tags sit in the
/// first IFDs, far below this.
#[cfg_attr(not(feature = "raw"), allow(dead_code))]
const MAX_RAW_READ: u64 = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct RawExtractor;

impl DateExtractor for RawExtractor {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        read_raw(path)
    }
}

#[cfg(not(feature = "raw"))]
fn read_raw(_path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    static WARNED: std::sync::Once = std::sync::Once::new();
    WARNED.call_once(|| {
        log::warn!(
            "RAW support not built in (enable the `raw` feature); \
             RAW dates come from the generic EXIF readers only"
        );
    });
    Ok(None)
}

#[cfg(feature = "raw")]
fn read_raw(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    use std::fs::File;
    use std::io::Read;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let file = File::open(path)?;
    let mut data = Vec::new();
    file.take(MAX_RAW_READ).read_to_end(&mut data)?;

    let found = match ext.as_str() {
        "raf" => read_raf(&data)?,
        "cr3" => read_cr3(&data)?,
        "orf" | "rw2" => {
            normalize_tiff_magic(&mut data);
            read_tiff(&data)?
        }
        _ => read_tiff(&data)?,
    };
    if found.is_some() {
        return Ok(found);
    }

    // Vendor wrappers we do not know about often still embed a plain block
    match crate::date::exif::find_tiff_block(&data) {
        Some(block) => date_in_tiff(block),
        None => Ok(None),
    }
}

/// ORF (`IIRO`, `IIRS`) and RW2 (`IIU\0`) are TIFF with a private magic.
#[cfg(feature = "raw")]
fn normalize_tiff_magic(data: &mut [u8]) {
    if data.len() < 4 {
        return;
    }
    if data.starts_with(b"II") {
        data[2..4].copy_from_slice(&[42, 0]);
    } else if data.starts_with(b"MM") {
        data[2..4].copy_from_slice(&[0, 42]);
    }
}

#[cfg(feature = "raw")]
fn read_tiff(data: &[u8]) -> Result<Option<CanonicalDate>, ExtractError> {
    if !(data.starts_with(b"II*\0") || data.starts_with(b"MM\0*")) {
        return Ok(None);
    }
    date_in_tiff(data)
}

#[cfg(feature = "raw")]
fn date_in_tiff(data: &[u8]) -> Result<Option<CanonicalDate>, ExtractError> {
    use crate::date::exif::{date_by_tag_number, parse_tiff_block, DATE_TAG_NUMBERS};

    let exif = parse_tiff_block(data.to_vec())?;
    Ok(date_by_tag_number(&exif, &DATE_TAG_NUMBERS))
}

/// RAF: big-endian offset and length of the embedded JPEG at bytes 84 and 88.
#[cfg(feature = "raw")]
fn read_raf(data: &[u8]) -> Result<Option<CanonicalDate>, ExtractError> {
    use crate::date::exif::find_tiff_block;

    if !data.starts_with(b"FUJIFILM") {
        return Err(ExtractError::malformed("raf", "missing FUJIFILM header"));
    }
    let be_u32 = |at: usize| -> Option<usize> {
        let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes) as usize)
    };
    let (Some(offset), Some(length)) = (be_u32(84), be_u32(88)) else {
        return Err(ExtractError::malformed("raf", "header truncated"));
    };
    let Some(jpeg) = offset.checked_add(length).and_then(|end| data.get(offset..end)) else {
        return Err(ExtractError::malformed("raf", "embedded JPEG out of bounds"));
    };

    match find_tiff_block(jpeg) {
        Some(block) => date_in_tiff(block),
        None => Ok(None),
    }
}

/// CR3: Canon stores IFD0 in a `CMT1` box and the Exif IFD in `CMT2`.
#[cfg(feature = "raw")]
fn read_cr3(data: &[u8]) -> Result<Option<CanonicalDate>, ExtractError> {
    for name in [b"CMT2", b"CMT1"] {
        let Some(payload) = find_box(data, name) else {
            continue;
        };
        if let Some(date) = date_in_tiff(payload)? {
            return Ok(Some(date));
        }
    }
    Ok(None)
}

/// Find an ISO-BMFF box by type and return its payload.
#[cfg(feature = "raw")]
fn find_box<'a>(data: &'a [u8], name: &[u8; 4]) -> Option<&'a [u8]> {
    let mut from = 4;
    while from < data.len() {
        let i = from + data[from..].windows(4).position(|w| w == name)?;
        let size = u32::from_be_bytes(data[i - 4..i].try_into().ok()?) as usize;
        if size >= 8 {
            if let Some(payload) = (i - 4).checked_add(size).and_then(|end| data.get(i + 4..end)) {
                return Some(payload);
            }
        }
        from = i + 4;
    }
    None
}
