//! Byte-level fixture builders shared by the unit tests.

use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tempfile::TempDir;

static RECORDS: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());

/// Keeps every log record so tests can assert on what was logged.
struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let mut records = RECORDS.lock().unwrap_or_else(|e| e.into_inner());
        records.push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Install the capturing logger. Safe to call from every test.
pub fn capture_logs() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
}

/// Warnings logged so far that mention `needle`. Tests run in parallel, so
/// `needle` should be unique to the calling test (a path, usually).
pub fn warnings_mentioning(needle: &str) -> Vec<String> {
    let records = RECORDS.lock().unwrap_or_else(|e| e.into_inner());
    records
        .iter()
        .filter(|(level, msg)| *level == log::Level::Warn && msg.contains(needle))
        .map(|(_, msg)| msg.clone())
        .collect()
}

/// Write `data` to `name` inside a fresh temp dir. Keep the dir alive.
pub fn write_temp(name: &str, data: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    (dir, path)
}

/// Little-endian TIFF with ASCII entries in IFD0 and, if non-empty, an Exif
/// sub-IFD. `magic` is 42 for real TIFF; ORF/RW2 tests pass vendor values.
pub fn tiff_bytes(magic: u16, ifd0: &[(u16, &str)], exif_ifd: &[(u16, &str)]) -> Vec<u8> {
    let n0 = ifd0.len() + usize::from(!exif_ifd.is_empty());
    let exif_off = 8 + 2 + 12 * n0 + 4;
    let data_off = if exif_ifd.is_empty() {
        exif_off
    } else {
        exif_off + 2 + 12 * exif_ifd.len() + 4
    };

    let mut data = Vec::new();
    let mut ascii = |entries: &[(u16, &str)]| -> Vec<(u16, u16, u32, u32)> {
        entries
            .iter()
            .map(|(tag, value)| {
                let offset = (data_off + data.len()) as u32;
                data.extend_from_slice(value.as_bytes());
                data.push(0);
                (*tag, 2u16, value.len() as u32 + 1, offset)
            })
            .collect()
    };

    let mut entries0 = ascii(ifd0);
    let mut entries1 = ascii(exif_ifd);
    if !exif_ifd.is_empty() {
        entries0.push((0x8769, 4, 1, exif_off as u32));
    }
    entries0.sort_by_key(|e| e.0);
    entries1.sort_by_key(|e| e.0);

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());
    write_ifd(&mut out, &entries0);
    if !exif_ifd.is_empty() {
        write_ifd(&mut out, &entries1);
    }
    assert_eq!(out.len(), data_off);
    out.extend_from_slice(&data);
    out
}

fn write_ifd(out: &mut Vec<u8>, entries: &[(u16, u16, u32, u32)]) {
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, typ, count, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&typ.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());
}

/// Minimal JPEG: SOI, one APP1 Exif segment, EOI.
pub fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// A single EXIF date (DateTimeOriginal) wrapped as a JPEG.
pub fn jpeg_with_date(date: &str) -> Vec<u8> {
    jpeg_with_exif(&tiff_bytes(42, &[], &[(0x9003, date)]))
}
