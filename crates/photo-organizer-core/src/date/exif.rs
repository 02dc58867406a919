use exif::{Exif, Field, In, Reader, Tag, Value};
use nom_exif::{EntryValue, ExifIter, ExifTag, MediaParser, MediaSource};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::validate::{validate, CanonicalDate};
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// DateTimeOriginal, DateTimeDigitized, DateTime.
pub const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Tag numbers of [`DATE_TAGS`], for readers that cannot rely on IFD context.
pub const DATE_TAG_NUMBERS: [u16; 3] = [0x9003, 0x9004, 0x0132];

const PRIMARY_TAGS: [Tag; 4] = [
    Tag::DateTimeOriginal,
    Tag::DateTimeDigitized,
    Tag::DateTime,
    Tag::GPSDateStamp,
];

/// EXIF datetimes have no timezone info: they are local time as-is.
pub fn ascii_value(field: &Field) -> Option<String> {
    match field.value {
        Value::Ascii(ref vec) => vec
            .first()
            .map(|b| String::from_utf8_lossy(b).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

/// First tag in `tags` (primary image) whose value validates.
pub fn date_from_exif(exif: &Exif, tags: &[Tag]) -> Option<CanonicalDate> {
    for tag in tags {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            if let Some(date) = validate(ascii_value(field).as_deref()) {
                log::debug!("Found EXIF date [{}]: {}", tag, date);
                return Some(date);
            }
        }
    }
    None
}

/// Like [`date_from_exif`] but matching on the bare tag number, so a
/// DateTimeOriginal stored in IFD0 (CR3 `CMT2`, some RAW writers) is found.
pub fn date_by_tag_number(exif: &Exif, numbers: &[u16]) -> Option<CanonicalDate> {
    for &number in numbers {
        let hit = exif
            .fields()
            .filter(|f| f.tag.number() == number)
            .find_map(|f| validate(ascii_value(f).as_deref()));
        if hit.is_some() {
            return hit;
        }
    }
    None
}

/// Parse a bare TIFF structure (no container), tolerating broken entries.
pub fn parse_tiff_block(data: Vec<u8>) -> Result<Exif, ExtractError> {
    let mut reader = Reader::new();
    reader.continue_on_error(true);
    match reader.read_raw(data) {
        Ok(exif) => Ok(exif),
        Err(exif::Error::PartialResult(partial)) => {
            let (exif, errors) = partial.into_inner();
            log::debug!("Recovered EXIF with {} broken entries", errors.len());
            Ok(exif)
        }
        Err(e) => Err(e.into()),
    }
}

/// Find an `Exif\0\0` marker followed by a TIFF header and return the slice
/// starting at that header.
pub fn find_tiff_block(data: &[u8]) -> Option<&[u8]> {
    let mut from = 0;
    while let Some(pos) = data[from..].windows(6).position(|w| w == b"Exif\0\0") {
        let start = from + pos + 6;
        let rest = &data[start..];
        if rest.starts_with(b"II*\0") || rest.starts_with(b"MM\0*") {
            return Some(rest);
        }
        from = start;
    }
    None
}

/// Strict strategy: kamadak-exif reading the file as a container.
pub fn read_exif_primary(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let file = File::open(path)?;
    let mut bufreader = BufReader::new(file);

    let exif = match Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(date_from_exif(&exif, &PRIMARY_TAGS))
}

/// Lenient strategy: an independently written parser (nom-exif), so a file
/// that trips one parser can still be read by the other.
pub fn read_exif_secondary(path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
    let ms = MediaSource::file_path(path)?;
    if !ms.has_exif() {
        return Ok(None);
    }

    let mut parser = MediaParser::new();
    let iter: ExifIter = parser.parse(ms)?;
    let exif: nom_exif::Exif = iter.into();

    for tag in [ExifTag::DateTimeOriginal, ExifTag::CreateDate, ExifTag::ModifyDate] {
        if let Some(date) = exif.get(tag).and_then(entry_to_date) {
            log::debug!("Found EXIF date via nom-exif [{:?}]: {}", tag, date);
            return Ok(Some(date));
        }
    }

    Ok(None)
}

/// Offsets are dropped, keeping the recorded wall-clock time.
pub fn entry_to_date(entry: &EntryValue) -> Option<CanonicalDate> {
    match entry {
        EntryValue::Time(dt) => CanonicalDate::from_naive(dt.naive_local()),
        EntryValue::NaiveDateTime(dt) => CanonicalDate::from_naive(*dt),
        EntryValue::Text(s) => validate(Some(s)),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct ExifPrimary;

impl DateExtractor for ExifPrimary {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        read_exif_primary(path)
    }
}

#[derive(Debug, Default)]
pub struct ExifSecondary;

impl DateExtractor for ExifSecondary {
    fn name(&self) -> &'static str {
        "exif-lenient"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        read_exif_secondary(path)
    }
}
